//! Integration tests for transfer bookkeeping
//!
//! Property-style checks on the in-flight list: its length tracks the
//! number of submitted-but-not-retired transfers through arbitrary
//! interleavings of submissions, completions, timeouts and cancels, and
//! the ceiling applies backpressure without growing the list.

mod support;

use engine::{MAX_INFLIGHT, UsbPort};
use engine::usb::Loopback;
use protocol::{TransferStatus, UsbError};
use support::{Call, connect_mock, test_hub};

fn open_port(lb: &Loopback) -> UsbPort {
    let mut port = UsbPort::new(lb.transport());
    port.open(0x1234, 0x5678).expect("open");
    port
}

mod list_integrity {
    use super::*;

    #[test]
    fn test_list_length_tracks_submissions_and_retirements() {
        let lb = Loopback::new();
        let mut port = open_port(&lb);
        let mut expected = 0usize;

        // Interleave submissions with servicing; the list length must
        // equal the model count at every step.
        for round in 0..4 {
            for _ in 0..=round {
                if port.submit_read(0, 0x81, 8) > 0 {
                    expected += 1;
                }
                assert_eq!(port.in_flight(), expected);
            }

            // Answer exactly one read; only that node retires.
            lb.push_report(0x81, &[round]);
            port.service(|_, _| {}).expect("service");
            expected -= 1;
            assert_eq!(port.in_flight(), expected);
        }

        // Drain the rest one report at a time.
        while expected > 0 {
            lb.push_report(0x81, &[0xff]);
            port.service(|_, _| {}).expect("service");
            expected -= 1;
            assert_eq!(port.in_flight(), expected);
        }
    }

    #[test]
    fn test_every_outcome_retires_exactly_one_node() {
        let lb = Loopback::new();
        let mut port = open_port(&lb);

        for status in [
            TransferStatus::Complete(3),
            TransferStatus::TimedOut,
            TransferStatus::Cancelled,
            TransferStatus::Failed(UsbError::Pipe),
        ] {
            port.submit_read(0, 0x81, 8);
            assert_eq!(port.in_flight(), 1);
            lb.script_status(status);
            let _ = port.service(|_, _| {});
            assert_eq!(port.in_flight(), 0, "node must not outlive completion");
        }

        let counters = port.counters();
        assert_eq!(counters.timed_out, 1);
        assert_eq!(counters.cancelled, 1);
        assert_eq!(counters.reads_inflight, 0);
    }

    #[test]
    fn test_mixed_directions_tracked_separately() {
        let lb = Loopback::new();
        lb.stall_writes(true);
        let mut port = open_port(&lb);

        port.submit_read(0, 0x81, 8);
        port.submit_interrupt_write(0, 0x01, &[1, 2]);
        port.submit_bulk_write(0, 0x02, &[3]);
        assert_eq!(port.in_flight(), 3);
        assert_eq!(port.counters().reads_inflight, 1);
        assert_eq!(port.counters().writes_inflight, 2);

        lb.release_writes();
        port.service(|_, _| {}).expect("service");
        assert_eq!(port.in_flight(), 1);
        assert_eq!(port.counters().writes_inflight, 0);
        assert_eq!(lb.written().len(), 2);
    }
}

mod backpressure {
    use super::*;

    #[test]
    fn test_submit_past_ceiling_returns_zero_without_growing_list() {
        let lb = Loopback::new();
        let mut port = open_port(&lb);

        for _ in 0..MAX_INFLIGHT {
            assert_eq!(port.submit_read(0, 0x81, 16), 16);
        }
        for _ in 0..5 {
            assert_eq!(port.submit_read(0, 0x81, 16), 0);
            assert_eq!(port.in_flight(), MAX_INFLIGHT);
        }
        assert_eq!(port.counters().dropped, 5);
    }

    #[test]
    fn test_polling_saturates_at_ceiling_through_the_hub() {
        let (mut hub, _clock) = test_hub();
        let (id, _lb, log) = connect_mock(&mut hub, 0x000a);

        // With no inbound data, every iteration submits one more read
        // until the ceiling holds the line.
        for _ in 0..MAX_INFLIGHT + 5 {
            hub.idle_iter();
        }

        assert_eq!(hub.in_flight(id), Some(MAX_INFLIGHT));
        let counters = hub.transfer_counters(id).expect("counters");
        assert_eq!(counters.reads_inflight, MAX_INFLIGHT);
        assert_eq!(counters.dropped, 5);

        // The device kept being polled; drops are silent backpressure,
        // not an error that would stop the scheduler.
        assert_eq!(
            log.count(|c| matches!(c, Call::Poll)),
            MAX_INFLIGHT + 5
        );
    }

    #[test]
    fn test_retired_read_frees_a_ceiling_slot() {
        let (mut hub, _clock) = test_hub();
        let (id, lb, _log) = connect_mock(&mut hub, 0x000a);

        for _ in 0..MAX_INFLIGHT {
            hub.idle_iter();
        }
        assert_eq!(hub.in_flight(id), Some(MAX_INFLIGHT));

        // One report retires one read; the next iteration's poll takes
        // the freed slot straight back to the ceiling.
        lb.push_report(support::EP_IN, &support::button_report(0, true));
        hub.idle_iter();
        assert_eq!(hub.in_flight(id), Some(MAX_INFLIGHT));
        assert_eq!(
            hub.transfer_counters(id).expect("counters").dropped,
            0
        );
    }
}
