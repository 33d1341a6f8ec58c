/*
 * proptest.rs
 *
 * property-based tests for the registry, the allocator's bookkeeping and
 * priority parsing. Runtime instances are private to each case, so the
 * process-wide runtime is never touched here.
 */

use std::collections::BTreeSet;
use std::io;

use proptest::prelude::*;

use sc_runtime::package::Registry;
use sc_runtime::priority::{Priority, parse_priority};
use sc_runtime::{LogStream, LogThreshold, PackageId, Runtime};

fn quiet_runtime() -> Runtime {
    let mut rt = Runtime::new();
    rt.set_log_defaults(
        Some(LogStream::Writer(Box::new(io::sink()))),
        None,
        LogThreshold::Explicit(Priority::Silent),
    );
    rt
}

/* ============================================================================
 * Registry Properties
 * ============================================================================ */

#[derive(Debug, Clone)]
enum Op {
    Register,
    /* index into the currently live ids, modulo their count */
    Unregister(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Register), any::<usize>().prop_map(Op::Unregister)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /* registered ids are exactly those registered and not yet removed,
     * never 0, and a new id is always the lowest free one */
    #[test]
    fn registry_ids_match_model(ops in prop::collection::vec(op(), 0..64)) {
        let mut reg = Registry::new();
        let mut live: BTreeSet<i32> = BTreeSet::new();

        for (n, op) in ops.into_iter().enumerate() {
            match op {
                Op::Register => {
                    let expected = (1..).find(|i| !live.contains(i)).unwrap();
                    let id = reg
                        .register(None, LogThreshold::Default, &format!("p{n}"), "prop")
                        .unwrap();
                    prop_assert_eq!(id.as_raw(), expected);
                    live.insert(expected);
                }
                Op::Unregister(pick) => {
                    if live.is_empty() {
                        continue;
                    }
                    let raw = *live.iter().nth(pick % live.len()).unwrap();
                    prop_assert!(reg.remove(PackageId::from_raw(raw)).is_ok());
                    live.remove(&raw);
                }
            }

            let ids: BTreeSet<i32> = reg.ids().into_iter().map(PackageId::as_raw).collect();
            prop_assert_eq!(&ids, &live);
            prop_assert!(!reg.is_registered(PackageId::SC));
        }
    }

    /* any unknown id is rejected, including negative ones */
    #[test]
    fn registry_remove_unknown_fails(raw in any::<i32>()) {
        let mut reg = Registry::new();
        prop_assert!(reg.remove(PackageId::from_raw(raw)).is_err());
    }
}

/* ============================================================================
 * Allocator Accounting Properties
 * ============================================================================ */

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /* allocating then releasing everything leaves a zero balance, and in
     * between the balance is the sum of the sizes */
    #[test]
    fn balanced_allocations_net_to_zero(sizes in prop::collection::vec(0usize..4096, 0..32)) {
        let mut rt = quiet_runtime();
        let pkg = rt.register(None, LogThreshold::Default, "prop", "allocator property");

        let blocks: Vec<_> = sizes.iter().map(|&s| rt.allocate(pkg, s)).collect();
        let total: usize = sizes.iter().sum();
        prop_assert_eq!(rt.balance(pkg).bytes, total as i64);
        prop_assert_eq!(rt.balance(pkg).objects, sizes.len() as i64);

        for block in blocks {
            // SAFETY: every block came from rt and is released exactly once.
            unsafe { rt.release(pkg, Some(block)) };
        }
        prop_assert!(rt.balance(pkg).is_zero());
    }

    /* reallocation moves the byte balance by the size difference only */
    #[test]
    fn reallocation_tracks_net_bytes(first in 0usize..4096, second in 0usize..4096) {
        let mut rt = quiet_runtime();
        let p = rt.allocate(PackageId::NONE, first);
        // SAFETY: p is live and came from rt.
        let q = unsafe { rt.reallocate(PackageId::NONE, Some(p), second) };
        prop_assert_eq!(rt.balance(PackageId::NONE).bytes, second as i64);
        prop_assert_eq!(rt.balance(PackageId::NONE).objects, 1);
        // SAFETY: q is live and came from rt.
        unsafe { rt.release(PackageId::NONE, Some(q)) };
        prop_assert!(rt.balance(PackageId::NONE).is_zero());
    }

    /* duplicated strings read back unchanged */
    #[test]
    fn duplicate_string_round_trips(s in "[^\\x00]{0,64}") {
        let mut rt = quiet_runtime();
        let p = rt.duplicate_string(PackageId::NONE, &s);
        // SAFETY: p holds s plus a terminating NUL and s has no interior NUL.
        let copy = unsafe { core::ffi::CStr::from_ptr(p.as_ptr().cast()) };
        prop_assert_eq!(copy.to_str().unwrap(), s.as_str());
        // SAFETY: p is live and came from rt.
        unsafe { rt.release(PackageId::NONE, Some(p)) };
    }
}

/* ============================================================================
 * Priority Parsing Properties
 * ============================================================================ */

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /* parse_priority never panics */
    #[test]
    fn priority_parse_never_panics(s in ".*") {
        let _ = parse_priority(&s);
    }

    /* numbers in range map to the level with that value, others fail */
    #[test]
    fn priority_numbers(n in -100i32..100) {
        let parsed = parse_priority(&n.to_string());
        if (0..=7).contains(&n) {
            prop_assert_eq!(parsed.unwrap().as_raw(), n);
        } else {
            prop_assert!(parsed.is_err());
        }
    }

    /* every name parses in any case, with or without the SC_LP_ prefix */
    #[test]
    fn priority_names_any_case(idx in 0usize..8, upper in any::<bool>(), prefixed in any::<bool>()) {
        let p = Priority::ALL[idx];
        let name = if upper { p.name().to_string() } else { p.name().to_lowercase() };
        let input = if prefixed { format!("sc_lp_{name}") } else { name };
        prop_assert_eq!(parse_priority(&input).unwrap(), p);
    }
}
