//! Operation registry and argument extraction
//!
//! Every remotely callable operation is registered by name together with its
//! [`Access`]. A request whose name is unknown, or whose access does not match
//! (reading a method, invoking an attribute), is answered with
//! `UnknownOperation` and never reaches a handler.

use std::collections::HashMap;

use st_protocol::{Access, CallbackId, Kwargs, Operation, RemoteError, Value, WidgetId};

/// Maps operation names to handlers of type `H`
#[derive(Debug)]
pub struct Registry<H> {
    target: &'static str,
    entries: HashMap<&'static str, (Access, H)>,
}

impl<H: Copy> Registry<H> {
    /// Create an empty registry; `target` names the object kind in errors
    pub fn new(target: &'static str) -> Self {
        Self {
            target,
            entries: HashMap::new(),
        }
    }

    /// Register an attribute read
    pub fn read(mut self, name: &'static str, handler: H) -> Self {
        self.entries.insert(name, (Access::Read, handler));
        self
    }

    /// Register a method
    pub fn invoke(mut self, name: &'static str, handler: H) -> Self {
        self.entries.insert(name, (Access::Invoke, handler));
        self
    }

    /// Find the handler for `operation`
    pub fn lookup(&self, operation: &Operation) -> Result<H, RemoteError> {
        match self.entries.get(operation.name()) {
            Some((access, handler)) if *access == operation.access() => Ok(*handler),
            Some((Access::Read, _)) => Err(RemoteError::unknown_operation(format!(
                "{} attribute '{}' is not callable",
                self.target,
                operation.name()
            ))),
            Some((Access::Invoke, _)) => Err(RemoteError::unknown_operation(format!(
                "{} method '{}' must be invoked",
                self.target,
                operation.name()
            ))),
            None => Err(RemoteError::unknown_operation(format!(
                "{} has no operation '{}'",
                self.target,
                operation.name()
            ))),
        }
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Positional and keyword arguments of one call.
///
/// Each parameter has a position and a name; a keyword argument wins over a
/// positional one, and an explicit `Unit` counts as absent.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    positional: &'a [Value],
    keyword: &'a Kwargs,
}

impl<'a> Args<'a> {
    pub fn new(positional: &'a [Value], keyword: &'a Kwargs) -> Self {
        Self {
            positional,
            keyword,
        }
    }

    fn get(&self, index: usize, name: &str) -> Option<&'a Value> {
        self.keyword
            .get(name)
            .or_else(|| self.positional.get(index))
            .filter(|v| !v.is_unit())
    }

    fn missing(name: &str) -> RemoteError {
        RemoteError::invalid_argument(format!("missing argument '{}'", name))
    }

    fn mistyped(name: &str, expected: &str, got: &Value) -> RemoteError {
        RemoteError::invalid_argument(format!(
            "argument '{}' must be {}, got {}",
            name,
            expected,
            got.type_name()
        ))
    }

    pub fn opt_i64(&self, index: usize, name: &str) -> Result<Option<i64>, RemoteError> {
        self.get(index, name)
            .map(|v| v.as_i64().ok_or_else(|| Self::mistyped(name, "int", v)))
            .transpose()
    }

    pub fn i64(&self, index: usize, name: &str) -> Result<i64, RemoteError> {
        self.opt_i64(index, name)?.ok_or_else(|| Self::missing(name))
    }

    pub fn opt_u16(&self, index: usize, name: &str) -> Result<Option<u16>, RemoteError> {
        self.opt_i64(index, name)?
            .map(|n| {
                u16::try_from(n).map_err(|_| {
                    RemoteError::invalid_argument(format!("argument '{}' out of range: {}", name, n))
                })
            })
            .transpose()
    }

    pub fn u16(&self, index: usize, name: &str) -> Result<u16, RemoteError> {
        self.opt_u16(index, name)?.ok_or_else(|| Self::missing(name))
    }

    pub fn u64(&self, index: usize, name: &str) -> Result<u64, RemoteError> {
        let n = self.i64(index, name)?;
        u64::try_from(n).map_err(|_| {
            RemoteError::invalid_argument(format!("argument '{}' must not be negative: {}", name, n))
        })
    }

    pub fn str(&self, index: usize, name: &str) -> Result<&'a str, RemoteError> {
        let value = self.get(index, name).ok_or_else(|| Self::missing(name))?;
        value.as_str().ok_or_else(|| Self::mistyped(name, "str", value))
    }

    /// A widget reference, given either as a widget value or a bare ID
    pub fn widget(&self, index: usize, name: &str) -> Result<WidgetId, RemoteError> {
        let value = self.get(index, name).ok_or_else(|| Self::missing(name))?;
        match value {
            Value::Widget(id) => Ok(*id),
            Value::Int(n) if *n >= 0 => Ok(WidgetId(*n as u64)),
            other => Err(Self::mistyped(name, "widget", other)),
        }
    }

    pub fn opt_callback(&self, index: usize, name: &str) -> Result<Option<CallbackId>, RemoteError> {
        self.get(index, name)
            .map(|v| v.as_callback().ok_or_else(|| Self::mistyped(name, "callback", v)))
            .transpose()
    }

    pub fn callback(&self, index: usize, name: &str) -> Result<CallbackId, RemoteError> {
        self.opt_callback(index, name)?.ok_or_else(|| Self::missing(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use st_protocol::RemoteErrorKind;

    fn double(n: i64) -> i64 {
        n * 2
    }

    #[test]
    fn test_lookup_checks_access() {
        let registry = Registry::<fn(i64) -> i64>::new("terminal")
            .read("width", double)
            .invoke("clear", double);

        assert!(registry.lookup(&Operation::read("width").unwrap()).is_ok());
        assert!(registry.lookup(&Operation::invoke("clear").unwrap()).is_ok());

        let err = registry.lookup(&Operation::invoke("width").unwrap()).unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::UnknownOperation);
        let err = registry.lookup(&Operation::read("clear").unwrap()).unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::UnknownOperation);
        let err = registry.lookup(&Operation::read("nope").unwrap()).unwrap_err();
        assert_eq!(err.message, "terminal has no operation 'nope'");
        assert_eq!(registry.names(), vec!["clear", "width"]);
    }

    #[test]
    fn test_keyword_overrides_positional() {
        let positional = vec![Value::Int(1), Value::Unit];
        let mut keyword = Kwargs::new();
        keyword.insert("x".into(), Value::Int(9));
        let args = Args::new(&positional, &keyword);

        assert_eq!(args.i64(0, "x").unwrap(), 9);
        assert_eq!(args.opt_i64(1, "y").unwrap(), None);
        assert!(args.i64(2, "z").is_err());
    }

    #[test]
    fn test_type_errors() {
        let positional = vec![Value::from("text"), Value::Int(-1), Value::Int(70000)];
        let keyword = Kwargs::new();
        let args = Args::new(&positional, &keyword);

        assert_eq!(
            args.i64(0, "n").unwrap_err().message,
            "argument 'n' must be int, got str"
        );
        assert!(args.u16(1, "w").is_err());
        assert!(args.u16(2, "w").is_err());
        assert!(args.u64(1, "ticks").is_err());
        assert_eq!(args.str(0, "msg").unwrap(), "text");
    }

    #[test]
    fn test_widget_argument_forms() {
        let positional = vec![Value::Widget(WidgetId(4)), Value::Int(5)];
        let keyword = Kwargs::new();
        let args = Args::new(&positional, &keyword);
        assert_eq!(args.widget(0, "id").unwrap(), WidgetId(4));
        assert_eq!(args.widget(1, "id").unwrap(), WidgetId(5));
    }
}
