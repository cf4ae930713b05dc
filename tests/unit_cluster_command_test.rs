use bytes::Bytes;
use zircondb::core::ZirconError;
use zircondb::core::cluster::failover::FailoverMode;
use zircondb::core::commands::cluster::{ClusterCommand, ClusterSubcommand, SetSlotSubcommand};
use zircondb::core::commands::command_trait::ParseCommand;
use zircondb::core::protocol::RespFrame;

fn bs(s: &str) -> RespFrame {
    RespFrame::BulkString(Bytes::from(s.to_string()))
}

#[test]
fn test_parse_requires_a_subcommand() {
    let err = ClusterCommand::parse(&[]).unwrap_err();
    assert!(matches!(err, ZirconError::WrongArgumentCount(_)));
}

#[test]
fn test_parse_simple_subcommands() {
    for (name, expected) in [
        ("INFO", "Info"),
        ("NODES", "Nodes"),
        ("SLOTS", "Slots"),
        ("MYID", "MyId"),
        ("HEALTH", "Health"),
        ("STATS", "Stats"),
        ("REBALANCE", "Rebalance"),
    ] {
        let cmd = ClusterCommand::parse(&[bs(name)]).unwrap();
        assert_eq!(format!("{:?}", cmd.subcommand), expected, "for {name}");
    }
}

#[test]
fn test_parse_is_case_insensitive() {
    let cmd = ClusterCommand::parse(&[bs("nOdEs")]).unwrap();
    assert!(matches!(cmd.subcommand, ClusterSubcommand::Nodes));
}

#[test]
fn test_parse_unknown_subcommand() {
    let err = ClusterCommand::parse(&[bs("FROBNICATE")]).unwrap_err();
    assert!(matches!(err, ZirconError::UnknownCommand(_)));
}

#[test]
fn test_parse_meet_with_and_without_port() {
    let cmd = ClusterCommand::parse(&[bs("MEET"), bs("10.0.0.1"), bs("7000")]).unwrap();
    assert!(matches!(
        cmd.subcommand,
        ClusterSubcommand::Meet { ref ip, port: Some(7000) } if ip == "10.0.0.1"
    ));

    let cmd = ClusterCommand::parse(&[bs("MEET"), bs("10.0.0.1")]).unwrap();
    assert!(matches!(
        cmd.subcommand,
        ClusterSubcommand::Meet { port: None, .. }
    ));

    assert!(ClusterCommand::parse(&[bs("MEET")]).is_err());
    assert!(ClusterCommand::parse(&[bs("MEET"), bs("a"), bs("b"), bs("c")]).is_err());
}

#[test]
fn test_parse_addslots() {
    let cmd = ClusterCommand::parse(&[bs("ADDSLOTS"), bs("0"), bs("5"), bs("16383")]).unwrap();
    assert!(matches!(
        cmd.subcommand,
        ClusterSubcommand::AddSlots(ref slots) if slots == &vec![0, 5, 16383]
    ));

    assert!(ClusterCommand::parse(&[bs("ADDSLOTS")]).is_err());
    // 16384 is the first invalid slot.
    assert!(ClusterCommand::parse(&[bs("ADDSLOTS"), bs("16384")]).is_err());
    assert!(ClusterCommand::parse(&[bs("ADDSLOTS"), bs("not-a-number")]).is_err());
}

#[test]
fn test_parse_setslot_variants() {
    let cmd =
        ClusterCommand::parse(&[bs("SETSLOT"), bs("500"), bs("MIGRATING"), bs("dest-id")]).unwrap();
    assert!(matches!(
        cmd.subcommand,
        ClusterSubcommand::SetSlot { slot: 500, subcommand: SetSlotSubcommand::Migrating(ref id) }
            if id == "dest-id"
    ));

    let cmd =
        ClusterCommand::parse(&[bs("SETSLOT"), bs("500"), bs("IMPORTING"), bs("src-id")]).unwrap();
    assert!(matches!(
        cmd.subcommand,
        ClusterSubcommand::SetSlot { subcommand: SetSlotSubcommand::Importing(_), .. }
    ));

    let cmd = ClusterCommand::parse(&[bs("SETSLOT"), bs("500"), bs("NODE"), bs("owner-id")]).unwrap();
    assert!(matches!(
        cmd.subcommand,
        ClusterSubcommand::SetSlot { subcommand: SetSlotSubcommand::Node(_), .. }
    ));

    let cmd = ClusterCommand::parse(&[bs("SETSLOT"), bs("500"), bs("STABLE")]).unwrap();
    assert!(matches!(
        cmd.subcommand,
        ClusterSubcommand::SetSlot { subcommand: SetSlotSubcommand::Stable, .. }
    ));
}

#[test]
fn test_parse_setslot_arity_errors() {
    // MIGRATING needs a node id; STABLE takes none.
    assert!(ClusterCommand::parse(&[bs("SETSLOT"), bs("500"), bs("MIGRATING")]).is_err());
    assert!(ClusterCommand::parse(&[bs("SETSLOT"), bs("500"), bs("STABLE"), bs("x")]).is_err());
    assert!(ClusterCommand::parse(&[bs("SETSLOT"), bs("500")]).is_err());
    assert!(ClusterCommand::parse(&[bs("SETSLOT"), bs("99999"), bs("STABLE")]).is_err());
}

#[test]
fn test_parse_failover_modes() {
    let cmd = ClusterCommand::parse(&[bs("FAILOVER")]).unwrap();
    assert!(matches!(
        cmd.subcommand,
        ClusterSubcommand::Failover(FailoverMode::Graceful)
    ));

    let cmd = ClusterCommand::parse(&[bs("FAILOVER"), bs("FORCE")]).unwrap();
    assert!(matches!(
        cmd.subcommand,
        ClusterSubcommand::Failover(FailoverMode::Force)
    ));

    let cmd = ClusterCommand::parse(&[bs("FAILOVER"), bs("TAKEOVER")]).unwrap();
    assert!(matches!(
        cmd.subcommand,
        ClusterSubcommand::Failover(FailoverMode::Takeover)
    ));

    assert!(ClusterCommand::parse(&[bs("FAILOVER"), bs("GENTLY")]).is_err());
}

#[test]
fn test_parse_key_slot_queries() {
    let cmd = ClusterCommand::parse(&[bs("COUNTKEYSINSLOT"), bs("42")]).unwrap();
    assert!(matches!(
        cmd.subcommand,
        ClusterSubcommand::CountKeysInSlot(42)
    ));
    assert!(ClusterCommand::parse(&[bs("COUNTKEYSINSLOT")]).is_err());

    let cmd = ClusterCommand::parse(&[bs("GETKEYSINSLOT"), bs("42"), bs("10")]).unwrap();
    assert!(matches!(
        cmd.subcommand,
        ClusterSubcommand::GetKeysInSlot { slot: 42, count: 10 }
    ));
    assert!(ClusterCommand::parse(&[bs("GETKEYSINSLOT"), bs("42")]).is_err());
}

#[test]
fn test_parse_forget() {
    let cmd = ClusterCommand::parse(&[bs("FORGET"), bs("some-node-id")]).unwrap();
    assert!(matches!(
        cmd.subcommand,
        ClusterSubcommand::Forget(ref id) if id == "some-node-id"
    ));
    assert!(ClusterCommand::parse(&[bs("FORGET")]).is_err());
}
