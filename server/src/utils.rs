use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Current unix time in whole seconds
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}

// Clamps a client-requested leaderboard size into 1..=100, 0 meaning the default of 10
pub fn leaderboard_limit(requested: u32) -> usize {
    match requested {
        0 => 10,
        n => n.min(100) as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_is_recent() {
        // 2020-01-01
        assert!(unix_timestamp() > 1_577_836_800);
    }

    #[test]
    fn test_leaderboard_limit_bounds() {
        assert_eq!(leaderboard_limit(0), 10);
        assert_eq!(leaderboard_limit(1), 1);
        assert_eq!(leaderboard_limit(25), 25);
        assert_eq!(leaderboard_limit(1000), 100);
    }
}
