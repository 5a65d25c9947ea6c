//! Property keys, symbols, and object identity.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a structured value or a handle wrapping one.
///
/// Targets, observable handles and boxed values all draw from the same
/// counter, so an id names exactly one allocation for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Generate a new unique object ID.
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A unique, non-string property key.
///
/// Equality and hashing use only the symbol's id, so two symbols with the
/// same description are still distinct keys.
#[derive(Debug, Clone)]
pub struct Symbol {
    id: u64,
    description: Cow<'static, str>,
    well_known: bool,
}

impl Symbol {
    pub const ITERATOR: Symbol = Symbol::builtin(0, "Symbol.iterator");
    pub const ASYNC_ITERATOR: Symbol = Symbol::builtin(1, "Symbol.asyncIterator");
    pub const HAS_INSTANCE: Symbol = Symbol::builtin(2, "Symbol.hasInstance");
    pub const TO_PRIMITIVE: Symbol = Symbol::builtin(3, "Symbol.toPrimitive");
    pub const TO_STRING_TAG: Symbol = Symbol::builtin(4, "Symbol.toStringTag");

    const FIRST_USER_ID: u64 = 64;

    const fn builtin(id: u64, description: &'static str) -> Self {
        Self {
            id,
            description: Cow::Borrowed(description),
            well_known: true,
        }
    }

    /// Create a fresh symbol with the given description.
    pub fn new(description: impl Into<Cow<'static, str>>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(Symbol::FIRST_USER_ID);
        Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            description: description.into(),
            well_known: false,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether this is one of the language-level well-known symbols.
    pub fn is_well_known(&self) -> bool {
        self.well_known
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Marker keys answered by observable handles without touching the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactiveFlag {
    /// Opt-out marker set by [`mark_raw`](crate::mark_raw).
    Skip,
    IsReactive,
    IsReadonly,
    IsShallow,
    /// Returns the wrapped value, but only to the canonical handle.
    Raw,
}

impl ReactiveFlag {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReactiveFlag::Skip => "__skip",
            ReactiveFlag::IsReactive => "__is_reactive",
            ReactiveFlag::IsReadonly => "__is_readonly",
            ReactiveFlag::IsShallow => "__is_shallow",
            ReactiveFlag::Raw => "__raw",
        }
    }

    pub fn from_key(key: &Key) -> Option<Self> {
        let Key::Str(name) = key else {
            return None;
        };
        match &**name {
            "__skip" => Some(ReactiveFlag::Skip),
            "__is_reactive" => Some(ReactiveFlag::IsReactive),
            "__is_readonly" => Some(ReactiveFlag::IsReadonly),
            "__is_shallow" => Some(ReactiveFlag::IsShallow),
            "__raw" => Some(ReactiveFlag::Raw),
            _ => None,
        }
    }

    pub fn key(&self) -> Key {
        Key::Str(Rc::from(self.as_str()))
    }
}

/// Keys that are read constantly by tooling and never worth a dependency.
const NON_TRACKABLE: &[&str] = &["__proto__", "__is_ref"];

const LENGTH: &str = "length";

/// A property key on a structured value.
///
/// String keys spelling a canonical non-negative integer ("0", "17", but not
/// "007" or "-1") are normalised to [`Key::Index`], so `"3"` and `3` address
/// the same slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Str(Rc<str>),
    Index(usize),
    Symbol(Symbol),
}

impl Key {
    /// The length key of an ordered sequence.
    pub fn length() -> Self {
        Key::Str(Rc::from(LENGTH))
    }

    pub fn is_length(&self) -> bool {
        matches!(self, Key::Str(s) if &**s == LENGTH)
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Str(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn is_builtin_symbol(&self) -> bool {
        matches!(self, Key::Symbol(sym) if sym.is_well_known())
    }

    pub(crate) fn is_non_trackable(&self) -> bool {
        match self {
            Key::Str(s) => NON_TRACKABLE.contains(&&**s),
            _ => false,
        }
    }
}

fn parse_index(s: &str) -> Option<usize> {
    if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
        return None;
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        match parse_index(s) {
            Some(i) => Key::Index(i),
            None => Key::Str(Rc::from(s)),
        }
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::from(s.as_str())
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl From<Symbol> for Key {
    fn from(sym: Symbol) -> Self {
        Key::Symbol(sym)
    }
}

impl From<ReactiveFlag> for Key {
    fn from(flag: ReactiveFlag) -> Self {
        flag.key()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => f.write_str(s),
            Key::Index(i) => write!(f, "{}", i),
            Key::Symbol(sym) => write!(f, "Symbol({})", sym.description()),
        }
    }
}
