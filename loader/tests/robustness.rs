//! Property tests: malformed input never reaches the takeover, and
//! well-formed banks always come back byte for byte.

mod common;

use common::*;
use proptest::collection::vec;
use proptest::prelude::*;
use revive_chunk::{SliceStream, StatefileWriter};
use revive_loader::{restore, CpuModel, LoaderConfig, Outcome, Session};
use revive_mem::sim::SparseMemory;

fn session(cpu: CpuModel) -> Session<revive_mem::sim::SimHost, SparseMemory> {
    Session::new(
        LoaderConfig::default().with_no_wait(true),
        caps(cpu),
        a1200_host(),
        SparseMemory::new(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn garbage_after_header_is_harmless(tail in vec(any::<u8>(), 0..512)) {
        let mut w = StatefileWriter::new();
        w.start().raw_bytes(&tail);
        let file = w.finish();
        let mut rig = Rig::new();
        let mut s = session(CpuModel::M68020);

        let outcome = restore(&mut s, SliceStream::new(&file), rig.services());

        if !matches!(outcome, Outcome::Resumed(_)) {
            prop_assert!(rig.handoff.events.is_empty());
        }
    }

    #[test]
    fn chip_bank_comes_back(pages in 1u32..128, seed in any::<u8>(), odd in 0u32..4) {
        let ram = pattern(pages * 4 * K - odd * 4, seed);
        let file = StatefileBuilder::new().cpu(68020).ram(b"CRAM", &ram).finish();
        let mut rig = Rig::new();
        let mut s = session(CpuModel::M68020);

        let outcome = restore(&mut s, SliceStream::new(&file), rig.services());

        prop_assert!(matches!(outcome, Outcome::Resumed(_)), "{:?}", outcome);
        prop_assert_eq!(s.memory.read_vec(0, ram.len() as u32), ram);
    }
}
