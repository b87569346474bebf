// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// Combines declarations and value changes into the nested scope tree.

use crate::diagnostics::Diagnostic;
use crate::hierarchy::{DeclItem, Info, ScopeDecl, VarDecl, VarIndex};
use crate::parser::{Events, RawDocument};
use crate::values::{LogicValue, Time, Value};
use crate::ParseOptions;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

const SYSTEMC_ROOT: &str = "SystemC";

/// Time ordered value changes of one id code.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct SignalSeries {
    times: Vec<Time>,
    values: Vec<Value>,
}

impl SignalSeries {
    fn from_events(events: Events) -> Self {
        let (times, values) = events.into_iter().unzip();
        Self { times, values }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[Time] {
        &self.times
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<(Time, &Value)> {
        Some((*self.times.get(index)?, self.values.get(index)?))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Time, &Value)> {
        self.times.iter().cloned().zip(self.values.iter())
    }

    /// Value at `time`, i.e., the last change at or before `time`.
    pub fn value_at(&self, time: Time) -> Option<&Value> {
        let end = self.times.partition_point(|&t| t <= time);
        end.checked_sub(1).map(|ii| &self.values[ii])
    }
}

/// A declared variable and the value changes of its id code.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Signal {
    pub decl: VarDecl,
    pub index: Option<VarIndex>,
    /// shared between all variables declared with the same id code
    pub series: Arc<SignalSeries>,
}

impl Signal {
    /// Bit `bit` of every value change. `None` for values without a bit representation.
    pub fn bits(&self, bit: u32) -> Vec<(Time, Option<LogicValue>)> {
        self.series.iter().map(|(t, v)| (t, v.bit(bit))).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum Node {
    Scope(Scope),
    Signal(Signal),
}

impl Node {
    pub fn as_scope(&self) -> Option<&Scope> {
        match self {
            Node::Scope(scope) => Some(scope),
            Node::Signal(_) => None,
        }
    }

    pub fn as_signal(&self) -> Option<&Signal> {
        match self {
            Node::Signal(signal) => Some(signal),
            Node::Scope(_) => None,
        }
    }
}

/// Scope with its children in declaration order. Keys are unique within a scope.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Scope {
    pub name: String,
    pub scope_type: String,
    entries: Vec<(String, Node)>,
}

impl Scope {
    fn new(name: String, scope_type: String) -> Self {
        Self {
            name,
            scope_type,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[(String, Node)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, node)| node)
    }

    pub fn scope(&self, key: &str) -> Option<&Scope> {
        self.get(key).and_then(Node::as_scope)
    }

    pub fn signal(&self, key: &str) -> Option<&Signal> {
        self.get(key).and_then(Node::as_signal)
    }

    /// Resolves a `/` or `.` separated path. Keys that contain a separator themselves are
    /// matched as a whole.
    pub fn lookup(&self, path: &str) -> Option<&Node> {
        for (key, node) in self.entries.iter() {
            let Some(rest) = path.strip_prefix(key.as_str()) else {
                continue;
            };
            if rest.is_empty() {
                return Some(node);
            }
            if let (Some(rest), Node::Scope(scope)) =
                (rest.strip_prefix(['/', '.']), node)
            {
                if let Some(found) = scope.lookup(rest) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// All signals below this scope, depth first, together with their `.` separated path.
    pub fn signals(&self) -> Vec<(String, &Signal)> {
        let mut out = Vec::new();
        let mut todo: Vec<(String, &Scope)> = vec![(String::new(), self)];
        while let Some((prefix, scope)) = todo.pop() {
            let mut child_scopes = Vec::new();
            for (key, node) in scope.entries.iter() {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match node {
                    Node::Signal(signal) => out.push((path, signal)),
                    Node::Scope(child) => child_scopes.push((path, child)),
                }
            }
            // visit children in declaration order
            todo.extend(child_scopes.into_iter().rev());
        }
        out
    }

    /// Inserts `node` under `key`, appending `-2`, `-3`, ... if the key is already taken.
    fn insert_unique(&mut self, key: String, node: Node, taken: &mut FxHashSet<String>) {
        let key = if taken.contains(&key) {
            (2..)
                .map(|n| format!("{key}-{n}"))
                .find(|candidate| !taken.contains(candidate))
                .unwrap_or(key)
        } else {
            key
        };
        taken.insert(key.clone());
        self.entries.push((key, node));
    }
}

/// Fully reconciled parse result.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Document {
    pub info: Info,
    /// root of the scope tree, unnamed
    pub data: Scope,
    pub diagnostics: Vec<Diagnostic>,
    /// false if a syntax error aborted the parse
    pub complete: bool,
}

impl Document {
    pub fn lookup(&self, path: &str) -> Option<&Node> {
        self.data.lookup(path)
    }

    pub fn signal(&self, path: &str) -> Option<&Signal> {
        self.lookup(path).and_then(Node::as_signal)
    }

    pub fn signals(&self) -> Vec<(String, &Signal)> {
        self.data.signals()
    }

    /// Duration of one time step in seconds, if the timescale is known.
    pub fn timescale_factor_seconds(&self) -> Option<f64> {
        self.info.timescale()?.to_seconds()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

struct SeriesTable {
    series: FxHashMap<String, Arc<SignalSeries>>,
}

impl SeriesTable {
    /// Each id code gets exactly one series, even if it never changes.
    fn get(&mut self, id_code: &str) -> Arc<SignalSeries> {
        if let Some(series) = self.series.get(id_code) {
            return series.clone();
        }
        let series = Arc::new(SignalSeries::default());
        self.series.insert(id_code.to_string(), series.clone());
        series
    }
}

fn build_signal(decl: VarDecl, table: &mut SeriesTable) -> Signal {
    Signal {
        index: decl.index(),
        series: table.get(&decl.id_code),
        decl,
    }
}

fn build_scope(decl: ScopeDecl, table: &mut SeriesTable) -> Scope {
    let mut scope = Scope::new(decl.name, decl.scope_type);
    let mut taken = FxHashSet::default();
    for item in decl.items {
        match item {
            DeclItem::Scope(child) => {
                let key = child.name.clone();
                scope.insert_unique(key, Node::Scope(build_scope(child, table)), &mut taken);
            }
            DeclItem::Var(var) => {
                let key = var.reference.clone();
                scope.insert_unique(key, Node::Signal(build_signal(var, table)), &mut taken);
            }
        }
    }
    scope
}

/// Turns the raw parse result into the nested tree.
pub(crate) fn reconcile(raw: RawDocument, options: &ParseOptions) -> Document {
    let RawDocument {
        info,
        scopes,
        data,
        implicit,
        diagnostics,
        complete,
    } = raw;

    let mut table = SeriesTable {
        series: data
            .into_iter()
            .map(|(id, events)| (id, Arc::new(SignalSeries::from_events(events))))
            .collect(),
    };

    let mut root = Scope::default();
    let mut taken = FxHashSet::default();
    for scope in scopes {
        let key = scope.name.clone();
        root.insert_unique(key, Node::Scope(build_scope(scope, &mut table)), &mut taken);
    }

    if options.strip_systemc_root {
        root = strip_systemc_root(root);
    }

    // placeholders for value changes that were never declared
    let mut taken: FxHashSet<String> = root.keys().map(str::to_string).collect();
    for id_code in implicit {
        let decl = VarDecl {
            id_code: id_code.clone(),
            size: 1,
            var_type: "implicit".to_string(),
            reference: id_code.clone(),
            bit_index: None,
        };
        root.insert_unique(id_code, Node::Signal(build_signal(decl, &mut table)), &mut taken);
    }

    Document {
        info,
        data: root,
        diagnostics,
        complete,
    }
}

fn strip_systemc_root(mut root: Scope) -> Scope {
    let only_systemc = matches!(
        root.entries.as_slice(),
        [(_, Node::Scope(scope))] if scope.name == SYSTEMC_ROOT
    );
    if only_systemc {
        if let Some((_, Node::Scope(systemc))) = root.entries.pop() {
            log::debug!("removing top level `{SYSTEMC_ROOT}` scope");
            root.entries = systemc.entries;
        }
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn reconcile_str(input: &str) -> Document {
        reconcile(parse(input, None), &ParseOptions::default())
    }

    #[test]
    fn test_series_value_at() {
        let series = SignalSeries::from_events(vec![
            (0, Value::Vector(1)),
            (5, Value::Vector(2)),
            (5, Value::Vector(3)),
            (9, Value::Vector(4)),
        ]);
        assert_eq!(series.len(), 4);
        assert_eq!(series.value_at(0), Some(&Value::Vector(1)));
        assert_eq!(series.value_at(4), Some(&Value::Vector(1)));
        // last change at the same time wins
        assert_eq!(series.value_at(5), Some(&Value::Vector(3)));
        assert_eq!(series.value_at(100), Some(&Value::Vector(4)));
        let series = SignalSeries::from_events(vec![(3, Value::Vector(1))]);
        assert_eq!(series.value_at(2), None);
        assert_eq!(series.get(0), Some((3, &Value::Vector(1))));
        assert_eq!(series.get(1), None);
    }

    #[test]
    fn test_insert_unique() {
        let mut scope = Scope::default();
        let mut taken = FxHashSet::default();
        let leaf = || Node::Scope(Scope::default());
        scope.insert_unique("a".to_string(), leaf(), &mut taken);
        scope.insert_unique("a-2".to_string(), leaf(), &mut taken);
        scope.insert_unique("a".to_string(), leaf(), &mut taken);
        scope.insert_unique("a".to_string(), leaf(), &mut taken);
        assert_eq!(scope.keys().collect::<Vec<_>>(), ["a", "a-2", "a-3", "a-4"]);
    }

    #[test]
    fn test_aliases_share_a_series() {
        let doc = reconcile_str(
            "$scope module a $end\n$var wire 1 ! clk $end\n$var wire 1 # idle $end\n$upscope $end\n\
             $scope module b $end\n$var wire 1 ! clock $end\n$var wire 1 # idle $end\n$upscope $end\n\
             $enddefinitions $end\n#0\n1!\n",
        );
        let a = doc.signal("a.clk").unwrap();
        let b = doc.signal("b/clock").unwrap();
        assert!(Arc::ptr_eq(&a.series, &b.series));
        assert_eq!(a.series.len(), 1);
        // never changing signals are empty, but aliases still share
        let a = doc.signal("a.idle").unwrap();
        let b = doc.signal("b.idle").unwrap();
        assert!(a.series.is_empty());
        assert!(Arc::ptr_eq(&a.series, &b.series));
    }

    #[test]
    fn test_lookup_with_dots_in_names() {
        let doc = reconcile_str(
            "$scope module top $end\n$var wire 1 ! a.b $end\n$scope module a $end\n$var wire 1 # c $end\n$upscope $end\n$upscope $end\n$enddefinitions $end\n",
        );
        assert_eq!(doc.signal("top.a.b").unwrap().decl.id_code, "!");
        assert_eq!(doc.signal("top.a.c").unwrap().decl.id_code, "#");
        assert_eq!(doc.signal("top/a/c").unwrap().decl.id_code, "#");
        assert!(doc.lookup("top.a").unwrap().as_scope().is_some());
        assert!(doc.lookup("top.x").is_none());
        let paths: Vec<_> = doc.signals().into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, ["top.a.b", "top.a.c"]);
    }

    #[test]
    fn test_implicit_signals() {
        let doc = reconcile_str(
            "$scope module top $end\n$var wire 1 ! clk $end\n$upscope $end\n$enddefinitions $end\n#1\n1?\n",
        );
        let implicit = doc.signal("?").unwrap();
        assert_eq!(implicit.decl.var_type, "implicit");
        assert_eq!(implicit.series.len(), 1);
        assert_eq!(doc.data.keys().collect::<Vec<_>>(), ["top", "?"]);
    }

    #[test]
    fn test_strip_systemc_root() {
        let input = "$scope module SystemC $end\n$scope module dut $end\n$var wire 1 ! clk $end\n$upscope $end\n$upscope $end\n$enddefinitions $end\n";
        let options = ParseOptions {
            strip_systemc_root: true,
            ..Default::default()
        };
        let doc = reconcile(parse(input, None), &options);
        assert!(doc.signal("dut.clk").is_some());
        let doc = reconcile(parse(input, None), &ParseOptions::default());
        assert!(doc.signal("SystemC.dut.clk").is_some());
    }

    #[test]
    fn test_bits() {
        let doc = reconcile_str(
            "$scope module top $end\n$var reg 2 ! r $end\n$upscope $end\n$enddefinitions $end\n#0\nb10 !\n#1\nbx1 !\n",
        );
        let signal = doc.signal("top.r").unwrap();
        assert_eq!(
            signal.bits(1),
            [(0, Some(LogicValue::One)), (1, Some(LogicValue::X))]
        );
        assert_eq!(
            signal.bits(0),
            [(0, Some(LogicValue::Zero)), (1, Some(LogicValue::One))]
        );
    }
}
