use bytes::Bytes;
use zircondb::core::commands::{Command, CommandFlags};
use zircondb::core::protocol::RespFrame;
use zircondb::core::ZirconError;

fn request(parts: &[&str]) -> RespFrame {
    RespFrame::Array(
        parts
            .iter()
            .map(|p| RespFrame::BulkString(Bytes::from(p.to_string())))
            .collect(),
    )
}

#[test]
fn test_dispatch_is_case_insensitive() {
    let command = Command::try_from(request(&["GeT", "mykey"])).unwrap();
    assert_eq!(command.name(), "get");
}

#[test]
fn test_unknown_command_is_rejected() {
    let err = Command::try_from(request(&["NOSUCHCMD"])).unwrap_err();
    assert!(matches!(err, ZirconError::UnknownCommand(_)));
}

#[test]
fn test_non_array_frame_is_rejected() {
    let err = Command::try_from(RespFrame::SimpleString("GET".to_string())).unwrap_err();
    assert!(matches!(err, ZirconError::InvalidRequest(_)));
}

#[test]
fn test_empty_request_is_rejected() {
    let err = Command::try_from(RespFrame::Array(vec![])).unwrap_err();
    assert!(matches!(err, ZirconError::InvalidRequest(_)));
}

#[test]
fn test_key_extraction_for_redirection() {
    let get = Command::try_from(request(&["GET", "k1"])).unwrap();
    assert_eq!(get.get_keys(), vec![Bytes::from_static(b"k1")]);

    let del = Command::try_from(request(&["DEL", "k1", "k2"])).unwrap();
    assert_eq!(
        del.get_keys(),
        vec![Bytes::from_static(b"k1"), Bytes::from_static(b"k2")]
    );

    // CLUSTER subcommands are admin operations, never key-routed.
    let cluster = Command::try_from(request(&["CLUSTER", "INFO"])).unwrap();
    assert!(cluster.get_keys().is_empty());
}

#[test]
fn test_command_flags_classification() {
    let get = Command::try_from(request(&["GET", "k"])).unwrap();
    assert!(get.get_flags().contains(CommandFlags::READONLY));

    let set = Command::try_from(request(&["SET", "k", "v"])).unwrap();
    assert!(set.get_flags().contains(CommandFlags::WRITE));

    let asking = Command::try_from(request(&["ASKING"])).unwrap();
    assert!(asking.get_flags().contains(CommandFlags::SESSION));

    let cluster = Command::try_from(request(&["CLUSTER", "NODES"])).unwrap();
    assert!(cluster.get_flags().contains(CommandFlags::ADMIN));
}

#[test]
fn test_set_parse_with_ttl_options() {
    let command = Command::try_from(request(&["SET", "k", "v", "EX", "10"])).unwrap();
    let Command::Set(set) = command else {
        panic!("expected SET");
    };
    assert_eq!(set.ttl, Some(std::time::Duration::from_secs(10)));

    let command = Command::try_from(request(&["SET", "k", "v", "PX", "1500"])).unwrap();
    let Command::Set(set) = command else {
        panic!("expected SET");
    };
    assert_eq!(set.ttl, Some(std::time::Duration::from_millis(1500)));

    assert!(Command::try_from(request(&["SET", "k", "v", "EX"])).is_err());
    assert!(Command::try_from(request(&["SET", "k"])).is_err());
}
