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

use crate::message::Token;
use std::collections::{BTreeSet, HashSet};
use std::sync::Mutex;

/// Issues and reclaims the tokens that correlate requests with responses.
///
/// Tokens are unique across the whole client (not scoped per remote).
/// Freed tokens are preferred for reuse, smallest first; otherwise a
/// counter is encoded into as few bytes as will hold it, so token lengths
/// grow only on demand. The empty token is never issued — it is reserved
/// for CoAP ping.
#[derive(Debug)]
pub struct TokenFactory {
    state: Mutex<TokenPool>,
    max_token_length: usize,
}

#[derive(Debug, Default)]
struct TokenPool {
    live: HashSet<Token>,
    freed: BTreeSet<Token>,
    next_value: u64,
}

impl TokenFactory {
    /// Creates a new factory issuing tokens of at most `max_token_length`
    /// bytes (clamped to [`Token::MAX_LEN`]).
    pub fn new(max_token_length: usize) -> TokenFactory {
        TokenFactory {
            state: Mutex::new(TokenPool {
                live: HashSet::new(),
                freed: BTreeSet::new(),
                // The empty token is reserved, so the counter starts at 1.
                next_value: 1,
            }),
            max_token_length: max_token_length.min(Token::MAX_LEN).max(1),
        }
    }

    /// Returns an unused token, or `None` if every token of the configured
    /// maximum length is live.
    pub fn acquire(&self) -> Option<Token> {
        let mut pool = self.state.lock().expect("token pool poisoned");

        if let Some(&token) = pool.freed.iter().next() {
            pool.freed.remove(&token);
            pool.live.insert(token);
            return Some(token);
        }

        let token = encode_token(pool.next_value, self.max_token_length)?;
        pool.next_value += 1;
        pool.live.insert(token);
        Some(token)
    }

    /// Returns `token` to the free pool. Releasing a token that is not
    /// currently live (including the empty token) logs and is a no-op.
    pub fn release(&self, token: Token) {
        let mut pool = self.state.lock().expect("token pool poisoned");
        if pool.live.remove(&token) {
            pool.freed.insert(token);
            debug!("Token {} passed back ({} live)", token, pool.live.len());
        } else {
            warn!("Tried to release unknown token {}", token);
        }
    }

    /// Returns the number of tokens currently handed out.
    pub fn live_count(&self) -> usize {
        self.state.lock().expect("token pool poisoned").live.len()
    }
}

/// Encodes `value` into the fewest big-endian bytes that hold it, up to
/// `max_len` bytes. Returns `None` once the value no longer fits.
fn encode_token(value: u64, max_len: usize) -> Option<Token> {
    let needed = (8 - (value.leading_zeros() / 8) as usize).max(1);
    if needed > max_len {
        return None;
    }
    let bytes = value.to_be_bytes();
    Some(Token::new(&bytes[8 - needed..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_grow_on_demand() {
        let factory = TokenFactory::new(8);

        assert_eq!(factory.acquire(), Some(Token::from(1u8)));
        assert_eq!(factory.acquire(), Some(Token::from(2u8)));

        for _ in 3..=0xFF {
            assert_eq!(factory.acquire().unwrap().len(), 1);
        }
        // 256 needs a second byte.
        assert_eq!(factory.acquire(), Some(Token::new(&[0x01, 0x00])));
    }

    #[test]
    fn freed_tokens_are_reused_smallest_first() {
        let factory = TokenFactory::new(8);
        let a = factory.acquire().unwrap();
        let b = factory.acquire().unwrap();
        let c = factory.acquire().unwrap();

        factory.release(c);
        factory.release(a);
        assert_eq!(factory.live_count(), 1);

        assert_eq!(factory.acquire(), Some(a));
        assert_eq!(factory.acquire(), Some(c));
        assert_ne!(factory.acquire(), Some(b));
    }

    #[test]
    fn release_of_unknown_token_is_a_noop() {
        let factory = TokenFactory::new(8);
        factory.release(Token::EMPTY);
        factory.release(Token::from(0x42u8));
        assert_eq!(factory.live_count(), 0);

        let a = factory.acquire().unwrap();
        factory.release(a);
        factory.release(a);
        assert_eq!(factory.live_count(), 0);
        assert_eq!(factory.acquire(), Some(a));
    }

    #[test]
    fn exhaustion_returns_none() {
        let factory = TokenFactory::new(1);
        for _ in 1..=0xFF {
            assert!(factory.acquire().is_some());
        }
        assert_eq!(factory.acquire(), None);

        factory.release(Token::from(7u8));
        assert_eq!(factory.acquire(), Some(Token::from(7u8)));
    }
}
