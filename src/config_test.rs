use super::*;

#[test]
fn env_parse_missing_returns_default() {
    let val: usize = env_parse("__TEST_UNWRAP_NONEXISTENT_KEY__", 42);
    assert_eq!(val, 42);
}

#[test]
fn env_parse_present_valid() {
    unsafe { std::env::set_var("__TEST_UNWRAP_EP_VALID__", "99") };
    let val: u64 = env_parse("__TEST_UNWRAP_EP_VALID__", 0);
    assert_eq!(val, 99);
    unsafe { std::env::remove_var("__TEST_UNWRAP_EP_VALID__") };
}

#[test]
fn env_parse_present_invalid_returns_default() {
    unsafe { std::env::set_var("__TEST_UNWRAP_EP_INVALID__", "notanumber") };
    let val: u16 = env_parse("__TEST_UNWRAP_EP_INVALID__", 7);
    assert_eq!(val, 7);
    unsafe { std::env::remove_var("__TEST_UNWRAP_EP_INVALID__") };
}

#[test]
fn defaults_match_constants() {
    let config = Config::default();
    assert_eq!(config.port, DEFAULT_PORT);
    assert!(config.database_url.is_none());
    assert_eq!(config.stats_interval, Duration::from_secs(3600));
    assert_eq!(config.client_channel_capacity, DEFAULT_CLIENT_CHANNEL_CAPACITY);
}
