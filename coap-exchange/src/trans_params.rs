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

use std::time::Duration;

/// Trait defining [CoAP transmission parameters][tp] as used by the
/// exchange core.
///
/// [tp]: https://tools.ietf.org/html/rfc7252#section-4.8
pub trait TransParams:
    std::fmt::Debug + Default + Copy + Sync + Send + Unpin + 'static
{
    /// Returns [`Self::ACK_TIMEOUT`].
    fn ack_timeout(&self) -> Duration {
        Self::ACK_TIMEOUT
    }

    /// Returns [`Self::ACK_RANDOM_FACTOR`].
    fn ack_random_factor(&self) -> f32 {
        Self::ACK_RANDOM_FACTOR
    }

    /// Returns [`Self::MAX_RETRANSMIT`].
    fn max_retransmit(&self) -> u32 {
        Self::MAX_RETRANSMIT
    }

    /// Returns [`Self::EXCHANGE_LIFETIME`].
    fn exchange_lifetime(&self) -> Duration {
        Self::EXCHANGE_LIFETIME
    }

    /// Returns [`Self::MAX_TOKEN_LENGTH`].
    fn max_token_length(&self) -> usize {
        Self::MAX_TOKEN_LENGTH
    }

    /// Base delay before the first retransmission of a confirmable message.
    const ACK_TIMEOUT: Duration = Duration::from_secs(2);

    /// Upper bound of the random scaling applied to each retransmission
    /// delay.
    const ACK_RANDOM_FACTOR: f32 = 1.5;

    /// Number of retransmissions of a confirmable message before the
    /// exchange is timed out.
    const MAX_RETRANSMIT: u32 = 4;

    /// From RFC7252:
    ///
    /// > `EXCHANGE_LIFETIME` is the time from starting to send a Confirmable
    /// > message to the time when an acknowledgement is no longer expected,
    /// > i.e., message-layer information about the message exchange can be
    /// > purged. [...] 247 seconds with the default transmission parameters.
    const EXCHANGE_LIFETIME: Duration = Duration::from_secs(247);

    /// Largest token length, in bytes, the token factory will issue.
    const MAX_TOKEN_LENGTH: usize = 8;

    /// Calculates the delay to wait before the `retransmission`-th
    /// retransmission of a confirmable message. `retransmission` is
    /// one-based: a value of 1 is the delay between the initial transmission
    /// and the first retransmission.
    ///
    /// The base delay doubles with each retransmission and is scaled by a
    /// random factor in `[1.0, ACK_RANDOM_FACTOR)`.
    fn retransmission_delay(&self, mut retransmission: u32) -> Duration {
        if retransmission == 0 {
            return Duration::from_secs(0);
        }

        // The wait after the MAX_RETRANSMIT-th copy doubles one last time.
        if retransmission > self.max_retransmit() + 1 {
            retransmission = self.max_retransmit() + 1;
        }

        let base = (self.ack_timeout().as_millis() as u64) << (retransmission - 1);

        const JDIV: u64 = 512u64;
        let rmod: u64 = (JDIV as f32 * (self.ack_random_factor() - 1.0)) as u64;
        let jmul = JDIV + rand::random::<u64>() % rmod.max(1);

        Duration::from_millis(base * jmul / JDIV)
    }
}

/// Set of the standard transmission parameters as recommended by
/// [IETF-RFC7252 Section 4.8].
///
/// [IETF-RFC7252 Section 4.8]: https://tools.ietf.org/html/rfc7252#section-4.8
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct StandardParams;

impl TransParams for StandardParams {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_with_jitter() {
        let params = StandardParams;
        for n in 1..=5u32 {
            let base = 2000u64 << (n - 1);
            for _ in 0..32 {
                let d = params.retransmission_delay(n).as_millis() as u64;
                assert!(d >= base, "delay {} below base {}", d, base);
                assert!(d < base * 3 / 2, "delay {} above {} * 1.5", d, base);
            }
        }
    }

    #[test]
    fn delay_saturates_after_final_wait() {
        let params = StandardParams;
        let d5 = params.retransmission_delay(5).as_millis();
        let d9 = params.retransmission_delay(9).as_millis();
        assert!(d5 >= 32_000 && d5 < 48_000);
        assert!(d9 >= 32_000 && d9 < 48_000);
        assert_eq!(params.retransmission_delay(0), Duration::from_secs(0));
    }
}
