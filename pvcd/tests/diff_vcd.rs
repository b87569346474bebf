// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// Compares our parse results against the (3rd party) `vcd` crate.

use rustc_hash::FxHashMap;
use std::io::BufReader;
use pvcd::simple::*;
use pvcd::*;

fn run_diff_test(vcd_filename: &str) {
    let ours = read(vcd_filename).expect("failed to parse");
    assert!(ours.complete, "{:?}", ours.diagnostics);

    let mut ref_parser =
        ::vcd::Parser::new(BufReader::new(std::fs::File::open(vcd_filename).unwrap()));
    let ref_header = match ref_parser.parse_header() {
        Ok(parsed) => parsed,
        Err(e) => {
            println!("WARN: skipping difftest because file cannot be parsed by the (3rd party!) rust vcd library");
            println!("{e:?}");
            return;
        }
    };

    diff_meta(&ours.info, &ref_header);
    let mut id_map = FxHashMap::default();
    for (ref_child, (_, our_child)) in itertools::zip_eq(
        ref_header
            .items
            .iter()
            .filter(|i| !matches!(i, ::vcd::ScopeItem::Comment(_))),
        ours.data.entries(),
    ) {
        diff_hierarchy_item(ref_child, our_child, &mut id_map);
    }
    diff_signals(ref_parser, &id_map);
}

fn normalize_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn diff_meta(ours: &Info, ref_header: &::vcd::Header) {
    if let Some(version) = &ref_header.version {
        assert_eq!(
            normalize_whitespace(version),
            normalize_whitespace(ours.version.as_deref().unwrap_or(""))
        );
    }
    if let Some(date) = &ref_header.date {
        assert_eq!(
            normalize_whitespace(date),
            normalize_whitespace(ours.date.as_deref().unwrap_or(""))
        );
    }
    match ref_header.timescale {
        None => assert!(ours.timescale().is_none()),
        Some((factor, unit)) => {
            let our_time = ours.timescale().unwrap();
            assert_eq!(factor, our_time.factor);
            let expected = match unit {
                ::vcd::TimescaleUnit::S => TimescaleUnit::Seconds,
                ::vcd::TimescaleUnit::MS => TimescaleUnit::MilliSeconds,
                ::vcd::TimescaleUnit::US => TimescaleUnit::MicroSeconds,
                ::vcd::TimescaleUnit::NS => TimescaleUnit::NanoSeconds,
                ::vcd::TimescaleUnit::PS => TimescaleUnit::PicoSeconds,
                ::vcd::TimescaleUnit::FS => TimescaleUnit::FemtoSeconds,
            };
            assert_eq!(our_time.unit, expected);
        }
    }
}

/// Maps each id code to one of our signals that carries its series.
fn diff_hierarchy_item<'a>(
    ref_item: &::vcd::ScopeItem,
    our_item: &'a Node,
    id_map: &mut FxHashMap<String, &'a Signal>,
) {
    match (ref_item, our_item) {
        (::vcd::ScopeItem::Scope(ref_scope), Node::Scope(our_scope)) => {
            assert_eq!(ref_scope.identifier, our_scope.name);
            assert_eq!(ref_scope.scope_type.to_string(), our_scope.scope_type);
            for (ref_child, (_, our_child)) in itertools::zip_eq(
                ref_scope
                    .items
                    .iter()
                    .filter(|i| !matches!(i, ::vcd::ScopeItem::Comment(_))),
                our_scope.entries(),
            ) {
                diff_hierarchy_item(ref_child, our_child, id_map);
            }
        }
        (::vcd::ScopeItem::Var(ref_var), Node::Signal(our_var)) => {
            assert_eq!(ref_var.code.to_string(), our_var.decl.id_code);
            assert_eq!(ref_var.reference, our_var.decl.reference);
            assert_eq!(ref_var.var_type.to_string(), our_var.decl.var_type);
            assert_eq!(ref_var.size, our_var.decl.size);
            match ref_var.index {
                None => assert!(our_var.index.is_none()),
                Some(::vcd::ReferenceIndex::BitSelect(bit)) => {
                    let index = our_var.index.unwrap();
                    assert_eq!(index.msb(), bit as i64);
                    assert_eq!(index.lsb(), bit as i64);
                }
                Some(::vcd::ReferenceIndex::Range(msb, lsb)) => {
                    let index = our_var.index.unwrap();
                    assert_eq!(index.msb(), msb as i64);
                    assert_eq!(index.lsb(), lsb as i64);
                }
            }
            id_map.insert(our_var.decl.id_code.clone(), our_var);
        }
        (::vcd::ScopeItem::Comment(_), _) => {}
        (other_ref, our) => panic!(
            "Unexpected combination of scope items: {:?} (expected) vs. {:?}",
            other_ref, our
        ),
    }
}

fn diff_value(ref_value: &str, ours: &Value) {
    let ref_value = ref_value.to_ascii_lowercase();
    match ours {
        Value::Logic(value) => assert_eq!(ref_value, value.to_string()),
        Value::Vector(value) => {
            assert_eq!(u64::from_str_radix(&ref_value, 2).ok(), Some(*value))
        }
        Value::Binary(bits) => assert_eq!(&ref_value, bits),
        other => panic!("expected a bit value, got {other:?}"),
    }
}

fn diff_signals<R: std::io::BufRead>(
    ref_reader: ::vcd::Parser<R>,
    id_map: &FxHashMap<String, &Signal>,
) {
    let mut current_time = 0u64;
    // number of changes we have already compared for each id
    let mut positions: FxHashMap<String, usize> = FxHashMap::default();
    let mut next_change = |id: &::vcd::IdCode, time: u64| -> (Time, Value) {
        let id = id.to_string();
        let signal = id_map[&id];
        let pos = positions.entry(id.clone()).or_default();
        let (our_time, our_value) = signal
            .series
            .get(*pos)
            .unwrap_or_else(|| panic!("missing change #{pos} for `{id}` @ {time}"));
        *pos += 1;
        (our_time, our_value.clone())
    };

    for cmd_res in ref_reader {
        match cmd_res.unwrap() {
            ::vcd::Command::Timestamp(new_time) => current_time = new_time,
            ::vcd::Command::ChangeScalar(id, value) => {
                let (time, ours) = next_change(&id, current_time);
                assert_eq!(time, current_time);
                diff_value(&value.to_string(), &ours);
            }
            ::vcd::Command::ChangeVector(id, value) => {
                let (time, ours) = next_change(&id, current_time);
                assert_eq!(time, current_time);
                diff_value(&value.to_string(), &ours);
            }
            ::vcd::Command::ChangeReal(id, value) => {
                let (time, ours) = next_change(&id, current_time);
                assert_eq!(time, current_time);
                assert_eq!(ours, Value::Real(value));
            }
            ::vcd::Command::ChangeString(id, value) => {
                let (time, ours) = next_change(&id, current_time);
                assert_eq!(time, current_time);
                assert_eq!(ours, Value::String(value));
            }
            _ => {}
        }
    }

    // we must not have recorded any additional changes
    for (id, signal) in id_map.iter() {
        assert_eq!(
            positions.get(id).cloned().unwrap_or(0),
            signal.series.len(),
            "{id}"
        );
    }
}

#[test]
fn diff_simple() {
    run_diff_test("inputs/simple.vcd");
}

#[test]
fn diff_counter() {
    run_diff_test("inputs/counter.vcd");
}

#[test]
fn diff_collisions() {
    run_diff_test("inputs/collisions.vcd");
}

#[test]
fn diff_systemc() {
    run_diff_test("inputs/systemc.vcd");
}
