// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// Header data and the scope/variable declaration tree as written in the VCD.

use rustc_hash::FxHashSet;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Timescale {
    pub factor: u32,
    pub unit: TimescaleUnit,
}

impl Timescale {
    pub fn new(factor: u32, unit: TimescaleUnit) -> Self {
        Timescale { factor, unit }
    }

    /// Parses the body of a `$timescale` command, e.g., `1ns`, `10 ps` or `1 s`.
    pub fn parse(text: &str) -> Option<Self> {
        let tokens: Vec<&str> = text.split_ascii_whitespace().collect();
        let (factor, unit) = match tokens.as_slice() {
            [token] => {
                // find the first non-numeric character
                match token.bytes().position(|c| !c.is_ascii_digit()) {
                    None => (*token, ""),
                    Some(pos) => (&token[..pos], &token[pos..]),
                }
            }
            [factor, unit] => (*factor, *unit),
            _ => return None,
        };
        let factor = factor.parse::<u32>().ok()?;
        Some(Timescale::new(factor, TimescaleUnit::from_name(unit)))
    }

    /// Duration of a single time step in seconds.
    pub fn to_seconds(&self) -> Option<f64> {
        let exponent = self.unit.to_exponent()?;
        Some(self.factor as f64 * 10f64.powi(exponent as i32))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum TimescaleUnit {
    FemtoSeconds,
    PicoSeconds,
    NanoSeconds,
    MicroSeconds,
    MilliSeconds,
    Seconds,
    Unknown,
}

impl TimescaleUnit {
    fn from_name(name: &str) -> Self {
        match name {
            "fs" => TimescaleUnit::FemtoSeconds,
            "ps" => TimescaleUnit::PicoSeconds,
            "ns" => TimescaleUnit::NanoSeconds,
            "us" => TimescaleUnit::MicroSeconds,
            "ms" => TimescaleUnit::MilliSeconds,
            "s" => TimescaleUnit::Seconds,
            _ => TimescaleUnit::Unknown,
        }
    }

    pub fn to_exponent(&self) -> Option<i8> {
        match &self {
            TimescaleUnit::FemtoSeconds => Some(-15),
            TimescaleUnit::PicoSeconds => Some(-12),
            TimescaleUnit::NanoSeconds => Some(-9),
            TimescaleUnit::MicroSeconds => Some(-6),
            TimescaleUnit::MilliSeconds => Some(-3),
            TimescaleUnit::Seconds => Some(0),
            TimescaleUnit::Unknown => None,
        }
    }
}

/// Contents of the `$version`, `$date`, `$timescale` and `$comment` commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Info {
    pub version: Option<String>,
    pub date: Option<String>,
    /// raw timescale text, e.g., `1ns`
    pub timescale: Option<String>,
    pub comment: Vec<String>,
}

impl Info {
    /// Parsed version of the raw `timescale` text.
    pub fn timescale(&self) -> Option<Timescale> {
        self.timescale.as_deref().and_then(Timescale::parse)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct VarIndex {
    msb: i64,
    lsb: i64,
}

impl VarIndex {
    pub fn new(msb: i64, lsb: i64) -> Self {
        Self { msb, lsb }
    }

    #[inline]
    pub fn msb(&self) -> i64 {
        self.msb
    }

    #[inline]
    pub fn lsb(&self) -> i64 {
        self.lsb
    }

    #[inline]
    pub fn length(&self) -> u64 {
        self.msb.abs_diff(self.lsb).saturating_add(1)
    }
}

/// A `$var` command.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct VarDecl {
    pub id_code: String,
    pub size: u32,
    pub var_type: String,
    pub reference: String,
    /// separate index word, e.g., the `[7:0]` in `$var reg 8 # data [7:0] $end`
    pub bit_index: Option<String>,
}

impl VarDecl {
    /// Bit range of the variable. Taken from the separate index word if present, otherwise
    /// from a bracketed suffix of the reference. An index is only accepted if its length
    /// matches the declared size, which distinguishes bit ranges from array indices.
    pub fn index(&self) -> Option<VarIndex> {
        let (_, index) = match &self.bit_index {
            Some(bit_index) => extract_suffix_index(bit_index.as_bytes()),
            None => extract_suffix_index(self.reference.as_bytes()),
        };
        index.filter(|index| index.length() == u64::from(self.size))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum DeclItem {
    Scope(ScopeDecl),
    Var(VarDecl),
}

/// A `$scope` command together with everything declared before the matching `$upscope`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct ScopeDecl {
    pub name: String,
    pub scope_type: String,
    pub items: Vec<DeclItem>,
}

impl ScopeDecl {
    pub fn new(name: impl Into<String>, scope_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope_type: scope_type.into(),
            items: Vec::new(),
        }
    }

    fn find_scope(&self, name: &str) -> Option<usize> {
        find_scope(&self.items, name)
    }
}

fn find_scope(items: &[DeclItem], name: &str) -> Option<usize> {
    items
        .iter()
        .position(|item| matches!(item, DeclItem::Scope(s) if s.name == name))
}

/// Tries to extract an index expression from the end of `value`. Ignores spaces.
/// Returns the index and the remaining bytes of `value` before the parsed index.
pub(crate) fn extract_suffix_index(value: &[u8]) -> (&[u8], Option<VarIndex>) {
    use ExtractSuffixIndexState as St;
    let mut state = St::SearchingForClosingBracket;

    for (ii, cc) in value.iter().enumerate().rev() {
        if *cc == b' ' {
            continue;
        }

        state = match state {
            St::SearchingForClosingBracket => {
                if *cc == b']' {
                    St::ParsingLsb(ii, 0, 1)
                } else {
                    return (&value[0..ii + 1], None);
                }
            }
            St::ParsingLsb(end, num, factor) => {
                if cc.is_ascii_digit() {
                    match push_digit(*cc, num, factor) {
                        Some((num, factor)) => St::ParsingLsb(end, num, factor),
                        None => return (value, None),
                    }
                } else if *cc == b'-' {
                    St::ParsingLsb(end, -num, factor)
                } else if *cc == b':' {
                    St::ParsingMsb(end, num, 0, 1)
                } else if *cc == b'[' {
                    St::LookingForName(ii, VarIndex::new(num, num))
                } else {
                    return (&value[0..end + 1], None);
                }
            }
            St::ParsingMsb(end, lsb, num, factor) => {
                if cc.is_ascii_digit() {
                    match push_digit(*cc, num, factor) {
                        Some((num, factor)) => St::ParsingMsb(end, lsb, num, factor),
                        None => return (value, None),
                    }
                } else if *cc == b'-' {
                    St::ParsingMsb(end, lsb, -num, factor)
                } else if *cc == b'[' {
                    St::LookingForName(ii, VarIndex::new(num, lsb))
                } else {
                    return (&value[0..end + 1], None);
                }
            }
            St::LookingForName(_, index) => {
                return (&value[0..ii + 1], Some(index));
            }
        };
    }

    match state {
        // the whole value is an index, e.g., `[7:0]`
        St::LookingForName(start, index) => (&value[0..start], Some(index)),
        _ => (value, None),
    }
}

/// Adds the next (more significant) decimal digit. `None` once the number no longer fits.
#[inline]
fn push_digit(cc: u8, num: i64, factor: i64) -> Option<(i64, i64)> {
    let digit = (cc - b'0') as i64;
    let num = digit.checked_mul(factor)?.checked_add(num)?;
    // the factor only has to fit if another digit follows
    let factor = factor.saturating_mul(10);
    Some((num, factor))
}

#[derive(Debug, Copy, Clone)]
enum ExtractSuffixIndexState {
    SearchingForClosingBracket,
    ParsingLsb(usize, i64, i64),
    ParsingMsb(usize, i64, i64, i64),
    LookingForName(usize, VarIndex),
}

struct OpenScope {
    scope: ScopeDecl,
    /// position in the parent when this scope re-opened an existing one
    reopened_at: Option<usize>,
}

/// Builds the declaration tree from a stream of `$scope`, `$var` and `$upscope` commands.
/// A top level scope only becomes part of the result once all of its nested scopes have
/// been closed again.
#[derive(Default)]
pub struct DeclarationBuilder {
    roots: Vec<ScopeDecl>,
    stack: Vec<OpenScope>,
    declared: FxHashSet<String>,
}

impl DeclarationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently open scopes.
    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_declared(&self, id_code: &str) -> bool {
        self.declared.contains(id_code)
    }

    pub fn open_scope(&mut self, name: &str, scope_type: &str) {
        // a scope with the same name in the same parent is re-opened instead of duplicated
        let duplicate = match self.stack.last_mut() {
            Some(parent) => parent
                .scope
                .find_scope(name)
                .and_then(|pos| match parent.scope.items.remove(pos) {
                    DeclItem::Scope(scope) => Some((pos, scope)),
                    DeclItem::Var(_) => None,
                }),
            None => self
                .roots
                .iter()
                .position(|s| s.name == name)
                .map(|pos| (pos, self.roots.remove(pos))),
        };
        let entry = match duplicate {
            Some((pos, scope)) => OpenScope {
                scope,
                reopened_at: Some(pos),
            },
            None => OpenScope {
                scope: ScopeDecl::new(name, scope_type),
                reopened_at: None,
            },
        };
        self.stack.push(entry);
    }

    /// Adds a variable to the innermost open scope. Returns the variable if no scope is open.
    pub fn add_var(&mut self, var: VarDecl) -> std::result::Result<(), VarDecl> {
        match self.stack.last_mut() {
            Some(parent) => {
                self.declared.insert(var.id_code.clone());
                parent.scope.items.push(DeclItem::Var(var));
                Ok(())
            }
            None => Err(var),
        }
    }

    /// Closes the innermost open scope. Returns `false` if no scope was open.
    pub fn close_scope(&mut self) -> bool {
        let Some(OpenScope { scope, reopened_at }) = self.stack.pop() else {
            return false;
        };
        match self.stack.last_mut() {
            Some(parent) => {
                let item = DeclItem::Scope(scope);
                match reopened_at {
                    Some(pos) => parent.scope.items.insert(pos, item),
                    None => parent.scope.items.push(item),
                }
            }
            None => match reopened_at {
                Some(pos) => self.roots.insert(pos, scope),
                None => self.roots.push(scope),
            },
        }
        true
    }

    /// Returns all committed top level scopes. Scopes that are still open are dropped.
    pub fn finish(self) -> Vec<ScopeDecl> {
        if !self.stack.is_empty() {
            log::debug!(
                "dropping {} scope(s) that were never closed",
                self.stack.len()
            );
        }
        self.roots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(id: &str, reference: &str) -> VarDecl {
        VarDecl {
            id_code: id.to_string(),
            size: 1,
            var_type: "wire".to_string(),
            reference: reference.to_string(),
            bit_index: None,
        }
    }

    #[test]
    fn test_timescale() {
        assert_eq!(
            Timescale::parse("1ns"),
            Some(Timescale::new(1, TimescaleUnit::NanoSeconds))
        );
        assert_eq!(
            Timescale::parse(" 10 ps "),
            Some(Timescale::new(10, TimescaleUnit::PicoSeconds))
        );
        assert_eq!(
            Timescale::parse("100"),
            Some(Timescale::new(100, TimescaleUnit::Unknown))
        );
        assert_eq!(Timescale::parse("ns"), None);
        assert_eq!(Timescale::parse("1 n s"), None);
        let seconds = Timescale::new(10, TimescaleUnit::MicroSeconds)
            .to_seconds()
            .unwrap();
        assert!((seconds - 1e-5).abs() < 1e-12);
    }

    #[test]
    fn test_extract_suffix_index() {
        let (name, index) = extract_suffix_index(b"data [7:0]");
        assert_eq!(name, b"data");
        assert_eq!(index, Some(VarIndex::new(7, 0)));
        let (name, index) = extract_suffix_index(b"bit[-3]");
        assert_eq!(name, b"bit");
        assert_eq!(index, Some(VarIndex::new(-3, -3)));
        let (name, index) = extract_suffix_index(b"[15:8]");
        assert_eq!(name, b"");
        assert_eq!(index, Some(VarIndex::new(15, 8)));
        assert_eq!(extract_suffix_index(b"clk").1, None);
        assert_eq!(extract_suffix_index(b"mem[a]").1, None);
    }

    #[test]
    fn test_extract_suffix_index_out_of_range() {
        let (name, index) = extract_suffix_index(b"a[99999999999999999999]");
        assert_eq!(name, b"a[99999999999999999999]");
        assert_eq!(index, None);
        assert_eq!(extract_suffix_index(b"a[1:99999999999999999999]").1, None);
        assert_eq!(
            extract_suffix_index(b"a[9223372036854775807]").1,
            Some(VarIndex::new(i64::MAX, i64::MAX))
        );
    }

    #[test]
    fn test_wide_var_index() {
        let mut decl = var("!", "a[4294967295:0]");
        decl.size = 1;
        assert_eq!(decl.index(), None);
        assert_eq!(VarIndex::new(4294967295, 0).length(), 1 << 32);
        assert_eq!(VarIndex::new(i64::MAX, i64::MIN).length(), u64::MAX);
        decl.size = u32::MAX;
        decl.reference = "a[4294967294:0]".to_string();
        assert_eq!(decl.index(), Some(VarIndex::new(4294967294, 0)));
    }

    #[test]
    fn test_var_index_must_match_size() {
        let mut decl = var("!", "data[7:0]");
        decl.size = 8;
        assert_eq!(decl.index(), Some(VarIndex::new(7, 0)));
        assert_eq!(decl.index().unwrap().length(), 8);
        // array element, not a bit range
        decl.size = 4;
        assert_eq!(decl.index(), None);
        let mut decl = var("\"", "data");
        decl.size = 2;
        decl.bit_index = Some("[0:1]".to_string());
        assert_eq!(decl.index(), Some(VarIndex::new(0, 1)));
    }

    #[test]
    fn test_nested_scopes_commit_at_depth_zero() {
        let mut b = DeclarationBuilder::new();
        b.open_scope("top", "module");
        b.open_scope("sub", "module");
        assert_eq!(b.depth(), 2);
        b.add_var(var("!", "clk")).unwrap();
        assert!(b.close_scope());
        assert!(b.is_declared("!"));
        // not committed yet
        b.open_scope("other", "task");
        assert!(b.close_scope());
        assert!(b.close_scope());
        assert!(!b.close_scope());
        b.open_scope("unfinished", "module");
        let roots = b.finish();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].name, "top");
        assert_eq!(roots[0].items.len(), 2);
    }

    #[test]
    fn test_duplicate_scopes_are_merged() {
        let mut b = DeclarationBuilder::new();
        b.open_scope("top", "module");
        b.open_scope("a", "module");
        b.add_var(var("!", "x")).unwrap();
        b.close_scope();
        b.add_var(var("#", "y")).unwrap();
        b.open_scope("a", "module");
        b.add_var(var("\"", "z")).unwrap();
        b.close_scope();
        b.close_scope();
        b.open_scope("top", "module");
        b.add_var(var("$", "w")).unwrap();
        b.close_scope();
        let roots = b.finish();
        assert_eq!(roots.len(), 1);
        let top = &roots[0];
        assert_eq!(top.items.len(), 3);
        match &top.items[0] {
            DeclItem::Scope(a) => {
                assert_eq!(a.name, "a");
                assert_eq!(a.items.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(&top.items[2], DeclItem::Var(v) if v.reference == "w"));
    }

    #[test]
    fn test_var_outside_of_scope() {
        let mut b = DeclarationBuilder::new();
        assert!(b.add_var(var("!", "clk")).is_err());
        assert!(!b.is_declared("!"));
    }
}
