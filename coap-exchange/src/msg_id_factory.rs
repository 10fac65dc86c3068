// Copyright 2019 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use crate::trans_params::TransParams;
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Instant;

const MSG_ID_SPACE: usize = 0x1_0000;

/// Allocates 16-bit message ids per remote endpoint.
///
/// Every id handed out stays reserved for `EXCHANGE_LIFETIME` so that a
/// delayed duplicate or a late acknowledgement cannot be confused with a
/// newer exchange. A rolling per-remote cursor keeps freshly retired ids
/// from being reused right away.
#[derive(Debug)]
pub struct MessageIdFactory<TP: TransParams> {
    remotes: Mutex<HashMap<SocketAddr, IdSpace>>,
    trans_params: TP,
}

#[derive(Debug, Default)]
struct IdSpace {
    reserved: HashSet<u16>,
    // FIFO by construction: ids retire in the order they were issued.
    retirements: VecDeque<(Instant, u16)>,
    next_candidate: u16,
}

impl<TP: TransParams> MessageIdFactory<TP> {
    /// Creates a new factory using the given transmission parameters.
    pub fn new(trans_params: TP) -> MessageIdFactory<TP> {
        MessageIdFactory {
            remotes: Mutex::new(HashMap::new()),
            trans_params,
        }
    }

    /// Reserves and returns the next available message id for `remote`, or
    /// `None` if all 65 536 ids are currently reserved for that remote.
    ///
    /// The id is released automatically once `EXCHANGE_LIFETIME` has
    /// elapsed; callers need not (and cannot) release it early.
    pub fn next_id(&self, remote: SocketAddr) -> Option<u16> {
        let now = Instant::now();
        let mut remotes = self.remotes.lock().expect("message-id state poisoned");
        let space = remotes.entry(remote).or_default();

        space.drain_retired(now);

        if space.reserved.len() == MSG_ID_SPACE {
            warn!("Message ID space for {} is saturated", remote);
            return None;
        }

        let mut candidate = space.next_candidate;
        while space.reserved.contains(&candidate) {
            candidate = candidate.wrapping_add(1);
        }

        space.next_candidate = candidate.wrapping_add(1);
        space.reserved.insert(candidate);
        space
            .retirements
            .push_back((now + self.trans_params.exchange_lifetime(), candidate));

        debug!("Reserved message ID {} for {}", candidate, remote);
        Some(candidate)
    }

    /// Returns the number of ids currently reserved for `remote`.
    pub fn reserved_count(&self, remote: SocketAddr) -> usize {
        let now = Instant::now();
        let mut remotes = self.remotes.lock().expect("message-id state poisoned");
        match remotes.get_mut(&remote) {
            Some(space) => {
                space.drain_retired(now);
                let count = space.reserved.len();
                if count == 0 {
                    remotes.remove(&remote);
                }
                count
            }
            None => 0,
        }
    }
}

impl IdSpace {
    fn drain_retired(&mut self, now: Instant) {
        while let Some(&(release_at, id)) = self.retirements.front() {
            if release_at > now {
                break;
            }
            self.retirements.pop_front();
            // Idempotent: the id may already be gone if the set was cleared.
            self.reserved.remove(&id);
        }
    }
}
