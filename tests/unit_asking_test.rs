use bytes::Bytes;
use zircondb::core::ZirconError;
use zircondb::core::commands::command_trait::ParseCommand;
use zircondb::core::commands::generic::{Asking, ReadOnly, ReadWrite};
use zircondb::core::protocol::RespFrame;

#[test]
fn test_asking_parse_no_args() {
    assert!(Asking::parse(&[]).is_ok());
}

#[test]
fn test_asking_parse_with_args() {
    let args = [RespFrame::BulkString(Bytes::from_static(b"extra_arg"))];
    let err = Asking::parse(&args).unwrap_err();
    assert!(matches!(err, ZirconError::WrongArgumentCount(_)));
}

#[test]
fn test_readonly_and_readwrite_parse() {
    assert!(ReadOnly::parse(&[]).is_ok());
    assert!(ReadWrite::parse(&[]).is_ok());

    let args = [RespFrame::Integer(1)];
    assert!(ReadOnly::parse(&args).is_err());
    assert!(ReadWrite::parse(&args).is_err());
}
