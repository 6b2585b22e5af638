use byte::TryRead;
use pretty_assertions::assert_eq;
use tsch_rs::{time::Duration, wire::Frame};
use tsch_rs_tests::run::{root_and_child, ROOT, SLOTFRAME_LENGTH};

/// Long enough to see a beacon on every beacon channel a few times
const JOIN_SLOTS: u64 = 4 * 3 * SLOTFRAME_LENGTH as u64;

#[test_log::test]
fn child_joins_root() {
    let (mut sim, root, child) = root_and_child(200);
    sim.aether.start_trace("child_joins_root");

    assert!(sim.node(root).is_synchronized());
    assert!(!sim.node(child).is_synchronized());

    assert!(sim.run_until(JOIN_SLOTS, |sim| sim.node(child).is_synchronized()));

    let root_status = sim.node(root).commander.status();
    let child_status = sim.node(child).commander.status();
    assert_eq!(child_status.asn, root_status.asn);
    assert_eq!(child_status.slot_offset, root_status.slot_offset);
    // The child booted 200 ticks late, so the beacon came in at 131 + 291 on its clock
    assert_eq!(child_status.time_correction, Duration::from_ticks(291));

    sim.run_slots(5 * SLOTFRAME_LENGTH as u64);

    let root_status = sim.node(root).commander.status();
    let child_status = sim.node(child).commander.status();
    assert!(child_status.is_synchronized);
    assert_eq!(child_status.asn, root_status.asn);
    assert_eq!(child_status.time_correction, Duration::ZERO);
    assert!(child_status.stats.num_sync_pkt >= 4);
    assert_eq!(child_status.stats.min_correction, Duration::ZERO);
    assert_eq!(child_status.stats.max_correction, Duration::ZERO);
    assert_eq!(child_status.stats.num_de_sync, 0);

    let trace = sim.aether.stop_trace();
    let frames: Vec<_> = sim.aether.parse_trace(trace).collect();
    assert!(frames.len() >= 5);
    for data in &frames {
        let (frame, _) = Frame::try_read(data, ()).unwrap();
        assert!(matches!(frame, Frame::Beacon(_)));
        assert_eq!(frame.source(), ROOT);
    }
}

#[test_log::test]
fn joins_from_any_boot_offset() {
    for delay in [0, 1, 100, 250, 400, 490] {
        let (mut sim, root, child) = root_and_child(delay);

        assert!(
            sim.run_until(JOIN_SLOTS, |sim| sim.node(child).is_synchronized()),
            "no sync with delay {delay}"
        );
        sim.run_slots(2 * SLOTFRAME_LENGTH as u64);

        let root_status = sim.node(root).commander.status();
        let child_status = sim.node(child).commander.status();
        assert!(child_status.is_synchronized, "lost sync with delay {delay}");
        assert_eq!(child_status.asn, root_status.asn, "delay {delay}");
    }
}

#[test_log::test]
fn beacon_at_the_end_of_the_slot_delays_joining() {
    // The beacon arrives 2 ticks before the end of the child's slot: too late to
    // synchronize on. The child stretches one slot and joins on a later beacon.
    let (mut sim, root, child) = root_and_child(133);

    assert!(sim.run_until(JOIN_SLOTS, |sim| sim.node(child).is_synchronized()));

    let root_status = sim.node(root).commander.status();
    let child_status = sim.node(child).commander.status();
    assert_eq!(child_status.asn, root_status.asn);
    assert_eq!(child_status.time_correction, Duration::from_ticks(113));
}

#[test_log::test]
fn desynchronizes_without_root() {
    let (mut sim, root, child) = root_and_child(200);

    assert!(sim.run_until(JOIN_SLOTS, |sim| sim.node(child).is_synchronized()));
    sim.run_slots(2 * SLOTFRAME_LENGTH as u64);
    assert!(sim.node(child).is_synchronized());

    sim.power_off(root);

    assert!(sim.run_until(4 * SLOTFRAME_LENGTH as u64, |sim| !sim
        .node(child)
        .is_synchronized()));
    assert_eq!(sim.node(child).commander.stats().num_de_sync, 1);

    // Scanning for a network that isn't there
    sim.run_slots(5 * SLOTFRAME_LENGTH as u64);
    assert!(!sim.node(child).is_synchronized());
    assert_eq!(sim.node(child).commander.stats().num_de_sync, 1);
}
