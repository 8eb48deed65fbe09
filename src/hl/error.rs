//! Error reporting.

use std::fmt;

/// The kind of an [`Error`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// A class, member or command name collides with an existing one.
    #[error("{what} \"{name}\" already defined{}", in_scope(.scope))]
    DuplicateDefinition {
        /// What kind of thing was being defined.
        what: &'static str,
        /// The colliding name.
        name: String,
        /// The scope the collision happened in, if any.
        scope: Option<String>,
    },
    /// A name cannot be used for what it was given for.
    #[error("bad name \"{name}\": {reason}")]
    InvalidName {
        /// The offending name.
        name: String,
        /// Why the name was rejected.
        reason: &'static str,
    },
    /// A class, member, command, variable or component could not be resolved.
    #[error("{what} \"{name}\" not found")]
    NotFound {
        /// What kind of thing was being looked up.
        what: &'static str,
        /// The name that failed to resolve.
        name: String,
    },
    /// An object or class was invoked with a member it does not have.
    #[error("unknown subcommand \"{name}\": must be {}", one_of(.candidates))]
    UnknownSubcommand {
        /// The subcommand that was invoked.
        name: String,
        /// The subcommands that would have been accepted.
        candidates: Vec<String>,
    },
    /// `configure` or `cget` was asked about an option nobody declares.
    #[error("unknown option \"{name}\"")]
    UnknownOption {
        /// The option name, including its leading dash.
        name: String,
    },
    /// A member was accessed from a scope its protection level does not allow.
    #[error("can't access \"{name}\": {protection} {what}")]
    ProtectionViolation {
        /// The member name.
        name: String,
        /// The protection that was violated, eg. `private`.
        protection: &'static str,
        /// What the member is, eg. `function`.
        what: &'static str,
    },
    /// A definition was malformed.
    #[error("{0}")]
    BadSyntax(String),
    /// A command was invoked with the wrong number of arguments.
    #[error("wrong # args: should be \"{usage}\"")]
    WrongArgs {
        /// The usage line of the command.
        usage: String,
    },
    /// A delegation target was empty at the time of the call.
    #[error("component \"{component}\" is not initialized in object \"{object}\"")]
    ComponentNotInitialized {
        /// The name of the component.
        component: String,
        /// The full name of the object.
        object: String,
    },
    /// A constructor failed. The object has been rolled back.
    #[error("{cause}")]
    ConstructionFailure {
        /// The name the object would have had.
        object: String,
        /// The error raised by the constructor.
        #[source]
        cause: Box<ErrorKind>,
    },
    /// A destructor failed. The object is still alive.
    #[error("{cause}")]
    DestructionFailure {
        /// The full name of the object.
        object: String,
        /// The error raised by the destructor.
        #[source]
        cause: Box<ErrorKind>,
    },
    /// An internal lookup that should never fail did.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
    /// An error raised by a user-defined body.
    #[error("{0}")]
    User(String),
}

fn in_scope(scope: &Option<String>) -> String {
    scope.as_ref().map(|scope| format!(" in {scope}")).unwrap_or_default()
}

fn one_of(candidates: &[String]) -> String {
    match candidates {
        [] => String::from("nothing"),
        [only] => only.clone(),
        [first, second] => format!("{first} or {second}"),
        [init @ .., last] => format!("{}, or {last}", init.join(", ")),
    }
}

/// An error, along with the trail of context lines it picked up while unwinding.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    info: Vec<String>,
}

impl Error {
    /// Creates a new error of the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, info: Vec::new() }
    }

    /// Creates a new user error. This is what bodies should return to signal failure.
    ///
    /// # Examples
    /// ```
    /// use heritage::{Error, ErrorKind};
    ///
    /// let error = Error::user("counter overflow");
    /// assert_eq!(error.to_string(), "counter overflow");
    /// assert_eq!(error.kind(), &ErrorKind::User("counter overflow".into()));
    /// ```
    pub fn user(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::User(message.into()))
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalInconsistency(message.into()))
    }

    pub(crate) fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound { what, name: name.into() })
    }

    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadSyntax(message.into()))
    }

    pub(crate) fn wrong_args(usage: impl Into<String>) -> Self {
        Self::new(ErrorKind::WrongArgs { usage: usage.into() })
    }

    /// Returns the kind of the error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns the context lines collected while the error unwound, innermost first.
    pub fn error_info(&self) -> &[String] {
        &self.info
    }

    /// Appends a context line to the error info.
    pub fn with_context(mut self, line: impl Into<String>) -> Self {
        self.info.push(line.into());
        self
    }

    /// Wraps the error into another kind, keeping the error info.
    pub(crate) fn map_kind(self, f: impl FnOnce(ErrorKind) -> ErrorKind) -> Self {
        Self { kind: f(self.kind), info: self.info }
    }

    /// Replaces the leading words of a `wrong # args` usage line, so that errors from forwarded
    /// calls name the command the user actually invoked.
    pub(crate) fn rewrite_usage(self, internal: &str, visible: &str) -> Self {
        self.map_kind(|kind| match kind {
            ErrorKind::WrongArgs { usage } => match usage.strip_prefix(internal) {
                Some(rest) => ErrorKind::WrongArgs { usage: format!("{visible}{rest}") },
                None => ErrorKind::WrongArgs { usage },
            },
            kind => kind,
        })
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}
