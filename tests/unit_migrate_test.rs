use bytes::Bytes;
use zircondb::core::ZirconError;
use zircondb::core::commands::command_trait::ParseCommand;
use zircondb::core::commands::generic::Migrate;
use zircondb::core::protocol::RespFrame;

fn bs(s: &str) -> RespFrame {
    RespFrame::BulkString(Bytes::from(s.to_string()))
}

#[test]
fn test_migrate_parse_positional_args() {
    let args = [bs("127.0.0.1"), bs("7979"), bs("mykey"), bs("0")];
    let cmd = Migrate::parse(&args).unwrap();
    assert_eq!(cmd.host, "127.0.0.1");
    assert_eq!(cmd.port, 7979);
    assert_eq!(cmd.key, Bytes::from_static(b"mykey"));
    assert_eq!(cmd.db_index, 0);
    assert!(!cmd.copy);
    assert!(!cmd.replace);
    assert!(cmd.auth.is_none());
}

#[test]
fn test_migrate_parse_copy_and_replace() {
    let args = [
        bs("127.0.0.1"),
        bs("7979"),
        bs("mykey"),
        bs("0"),
        bs("copy"),
        bs("replace"),
    ];
    let cmd = Migrate::parse(&args).unwrap();
    assert!(cmd.copy);
    assert!(cmd.replace);
}

#[test]
fn test_migrate_parse_timeout_option() {
    let args = [
        bs("127.0.0.1"),
        bs("7979"),
        bs("mykey"),
        bs("0"),
        bs("TIMEOUT"),
        bs("250"),
    ];
    let cmd = Migrate::parse(&args).unwrap();
    assert_eq!(cmd.timeout_ms, 250);
}

#[test]
fn test_migrate_parse_auth_option() {
    let args = [
        bs("127.0.0.1"),
        bs("7979"),
        bs("mykey"),
        bs("0"),
        bs("AUTH"),
        bs("sekrit"),
    ];
    let cmd = Migrate::parse(&args).unwrap();
    assert_eq!(cmd.auth.as_deref(), Some("sekrit"));
}

#[test]
fn test_migrate_parse_rejects_bad_input() {
    // Too few arguments.
    assert!(Migrate::parse(&[bs("127.0.0.1"), bs("7979"), bs("k")]).is_err());
    // Unknown option.
    let args = [bs("127.0.0.1"), bs("7979"), bs("k"), bs("0"), bs("bogus")];
    assert!(matches!(
        Migrate::parse(&args).unwrap_err(),
        ZirconError::SyntaxError
    ));
    // TIMEOUT without a value.
    let args = [bs("127.0.0.1"), bs("7979"), bs("k"), bs("0"), bs("TIMEOUT")];
    assert!(Migrate::parse(&args).is_err());
    // Non-numeric port.
    assert!(Migrate::parse(&[bs("h"), bs("not-a-port"), bs("k"), bs("0")]).is_err());
}
