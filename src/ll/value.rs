//! Host values.
//!
//! Everything the host passes around is a string. Lists are kept structured so that they don't
//! have to be re-parsed every time they cross a command boundary, but they always have a string
//! form and compare equal to nothing but other lists.

use std::{borrow::Cow, fmt, rc::Rc};

/// A host value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// A plain string.
    Str(Rc<str>),
    /// A list of values.
    List(Rc<[Value]>),
}

impl Value {
    /// Creates a new string value.
    pub fn new(s: impl Into<Rc<str>>) -> Self {
        Self::Str(s.into())
    }

    /// Returns the empty string.
    pub fn empty() -> Self {
        Self::Str(Rc::from(""))
    }

    /// Creates a list value out of an iterator of values.
    pub fn list(elements: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::List(elements.into_iter().map(Into::into).collect())
    }

    /// Returns whether the value is the empty string or an empty list.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Str(s) => s.is_empty(),
            Self::List(l) => l.is_empty(),
        }
    }

    /// Returns the string form of the value.
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            Self::Str(s) => Cow::Borrowed(s),
            Self::List(_) => Cow::Owned(self.to_string()),
        }
    }

    /// Returns the string form of the value as a shared string.
    pub fn to_rc_str(&self) -> Rc<str> {
        match self {
            Self::Str(s) => Rc::clone(s),
            Self::List(_) => Rc::from(self.to_string()),
        }
    }

    /// Interprets the value as a list.
    ///
    /// Strings are split on whitespace, with braces grouping words together. Unbalanced braces
    /// are tolerated; the group simply extends to the end of the string.
    pub fn to_list(&self) -> Vec<Value> {
        match self {
            Self::List(l) => l.to_vec(),
            Self::Str(s) => split_list(s).into_iter().map(Value::from).collect(),
        }
    }

    /// Interprets the value as a boolean, the way the host does: `1`, `true`, `yes` and `on` are
    /// true, everything else is false.
    pub fn is_truthy(&self) -> bool {
        matches!(&*self.as_str(), "1" | "true" | "yes" | "on")
    }
}

fn split_list(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut chars = s.chars().peekable();
    loop {
        while chars.peek().map_or(false, |c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else { break };
        let mut word = String::new();
        if first == '{' {
            chars.next();
            let mut depth = 1;
            for c in chars.by_ref() {
                match c {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => (),
                }
                word.push(c);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                word.push(c);
                chars.next();
            }
        }
        words.push(word);
    }
    words
}

fn needs_braces(s: &str) -> bool {
    s.is_empty() || s.chars().any(|c| c.is_whitespace() || matches!(c, '{' | '}' | '"' | ';'))
}

impl Default for Value {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::List(elements) => {
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    let s = element.as_str();
                    if needs_braces(&s) {
                        write!(f, "{{{s}}}")?;
                    } else {
                        f.write_str(&s)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::Str(Rc::from(s.as_str()))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Self::Str(s)
    }
}

impl From<&Rc<str>> for Value {
    fn from(s: &Rc<str>) -> Self {
        Self::Str(Rc::clone(s))
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

/// Booleans are represented as `1` and `0`.
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::from(if b { "1" } else { "0" })
    }
}

macro_rules! value_from_integer {
    ($($T:ty),*) => {
        $(
            impl From<$T> for Value {
                fn from(x: $T) -> Self {
                    Self::from(x.to_string())
                }
            }
        )*
    };
}

value_from_integer!(i32, i64, u32, u64, usize);

impl From<Vec<Value>> for Value {
    fn from(elements: Vec<Value>) -> Self {
        Self::List(Rc::from(elements))
    }
}
