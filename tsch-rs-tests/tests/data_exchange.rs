use pretty_assertions::assert_eq;
use tsch_rs::mac::commander::SendOutcome;
use tsch_rs_tests::run::{root_and_child, Simulation, CHILD, ROOT, SLOTFRAME_LENGTH};

const JOIN_SLOTS: u64 = 4 * 3 * SLOTFRAME_LENGTH as u64;

fn joined(child_boot_delay: u64) -> (Simulation, usize, usize) {
    let (mut sim, root, child) = root_and_child(child_boot_delay);
    assert!(sim.run_until(JOIN_SLOTS, |sim| sim.node(child).is_synchronized()));
    (sim, root, child)
}

#[test_log::test]
fn uplink_and_downlink() {
    let (mut sim, root, child) = joined(200);

    sim.node(child).send(b"up");
    sim.node(root).send(b"down");
    sim.run_slots(2 * SLOTFRAME_LENGTH as u64);

    assert_eq!(sim.node(root).received_data(), vec![(CHILD, b"up".to_vec())]);
    assert_eq!(sim.node(child).received_data(), vec![(ROOT, b"down".to_vec())]);
    assert_eq!(sim.node(child).send_outcomes(), vec![SendOutcome::Success]);
    assert_eq!(sim.node(root).send_outcomes(), vec![SendOutcome::Success]);

    assert!(sim.node(child).is_synchronized());
    assert_eq!(sim.node(child).commander.queued(), 0);
}

#[test_log::test]
fn frames_wait_for_synchronization() {
    let (mut sim, root, child) = root_and_child(300);

    sim.node(child).send(b"early");
    // The first beacon cell of the root is still ahead
    sim.run_slots(SLOTFRAME_LENGTH as u64 / 2);
    assert!(!sim.node(child).is_synchronized());
    assert_eq!(sim.node(child).commander.queued(), 1);
    assert!(sim.node(child).send_outcomes().is_empty());

    assert!(sim.run_until(JOIN_SLOTS, |sim| sim.node(child).is_synchronized()));
    sim.run_slots(2 * SLOTFRAME_LENGTH as u64);

    assert_eq!(sim.node(root).received_data(), vec![(CHILD, b"early".to_vec())]);
    assert_eq!(sim.node(child).send_outcomes(), vec![SendOutcome::Success]);
}

#[test_log::test]
fn one_frame_per_cell() {
    let (mut sim, root, child) = joined(50);

    for i in 0..3u8 {
        sim.node(child).send(&[i]);
    }

    sim.run_slots(SLOTFRAME_LENGTH as u64);
    // One transmit cell passed
    assert_eq!(sim.node(root).received_data().len(), 1);

    sim.run_slots(3 * SLOTFRAME_LENGTH as u64);
    assert_eq!(
        sim.node(root).received_data(),
        vec![(CHILD, vec![0]), (CHILD, vec![1]), (CHILD, vec![2])]
    );
    assert_eq!(sim.node(child).send_outcomes(), vec![SendOutcome::Success; 3]);
}

#[test_log::test]
fn single_channel() {
    let (mut sim, root, child) = joined(200);

    sim.node(root).commander.set_single_channel(15).unwrap();
    sim.node(child).commander.set_single_channel(15).unwrap();
    sim.run_slots(1);

    sim.node(child).send(b"fixed");
    sim.run_slots(2 * SLOTFRAME_LENGTH as u64);
    assert_eq!(sim.node(root).received_data(), vec![(CHILD, b"fixed".to_vec())]);

    // Back to hopping
    sim.node(root).commander.set_single_channel(0).unwrap();
    sim.node(child).commander.set_single_channel(0).unwrap();
    sim.run_slots(1);

    sim.node(child).send(b"hopping");
    sim.run_slots(2 * SLOTFRAME_LENGTH as u64);
    assert_eq!(
        sim.node(root).received_data(),
        vec![(CHILD, b"fixed".to_vec()), (CHILD, b"hopping".to_vec())]
    );
    assert!(sim.node(child).is_synchronized());
}

#[test_log::test]
fn buffers_are_returned() {
    let (mut sim, root, child) = joined(200);

    for _ in 0..4 {
        sim.node(child).send(b"ping");
        sim.node(root).send(b"pong");
        sim.run_slots(SLOTFRAME_LENGTH as u64);
    }

    assert_eq!(sim.node(root).received_data().len(), 4);
    assert_eq!(sim.node(child).received_data().len(), 4);
    assert_eq!(sim.node(root).pool.in_use(), 0);
    assert_eq!(sim.node(child).pool.in_use(), 0);
}
