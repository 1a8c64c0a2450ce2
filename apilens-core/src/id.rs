// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Identifier helpers.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of the random tail appended to generated ids.
const SUFFIX_LEN: usize = 9;

/// Lowercase alphanumeric random string of `len` characters.
pub fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

/// Build a unique id of the form `{prefix}_{millis}_{random}`.
pub fn generate_id(prefix: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}",
        prefix,
        at.timestamp_millis(),
        random_suffix(SUFFIX_LEN)
    )
}

/// Default session id when a caller does not supply one.
pub fn time_based_session_id(at: DateTime<Utc>) -> String {
    format!("session_{}", at.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_id_shape() {
        let at = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let id = generate_id("http", at);
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "http");
        assert_eq!(parts[1], "1700000000000");
        assert_eq!(parts[2].len(), SUFFIX_LEN);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_generate_id_unique() {
        let at = Utc::now();
        let ids: HashSet<String> = (0..1000).map(|_| generate_id("grpc", at)).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_time_based_session_id() {
        let at = DateTime::<Utc>::from_timestamp_millis(42).unwrap();
        assert_eq!(time_based_session_id(at), "session_42");
    }
}
