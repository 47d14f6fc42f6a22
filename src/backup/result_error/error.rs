use crate::backup::result_error::{WithDebugObjectAndFnName, WithFnName, WithMsg};
use itertools::Itertools;
use std::fmt::Debug;
use std::path::{PathBuf, StripPrefixError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    LiblzmaStream(#[from] liblzma::stream::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    StripPrefix(#[from] StripPrefixError),
    #[error(transparent)]
    GlobSet(#[from] globset::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("Precondition failed: {0}")]
    Precondition(String),
    #[error("Create archive of {:?} failed:\n{}", path, indent::indent_all_with("  ", error.to_string()))]
    Archive { path: PathBuf, error: Box<Error> },
    #[error("Lookup of {:?} failed:\n{}", key, indent::indent_all_with("  ", error.to_string()))]
    Lookup { key: String, error: Box<Error> },
    #[error("Delete of {:?} failed:\n{}", key, indent::indent_all_with("  ", error.to_string()))]
    Deletion { key: String, error: Box<Error> },
    #[error("Command `{command}` failed: {summary}")]
    Command { command: String, summary: String },
    #[error("Key {0:?} contains wildcard characters the object store cannot address")]
    WildcardKey(String),
    #[error("Invalid fingerprint {0:?}, expected 64 lowercase hex characters")]
    InvalidFingerprint(String),
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{:?} {} failed:\n{}", obj_debug, fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send>,
        fn_name: String,
    },
    #[error("{} failed:\n{}", fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithFnName { error: Box<Error>, fn_name: String },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>, O: Debug + Send + 'static> WithDebugObjectAndFnName<S, O> for Error {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl<S: Into<String>> WithFnName<S> for Error {
    fn with_fn_name(self, fn_name: S) -> Self {
        Self::WithFnName {
            error: Box::new(self),
            fn_name: fn_name.into(),
        }
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        if errors.is_empty() {
            panic!("Should not create lots of errors when error is empty")
        }
        Self::LotsOfError(errors.into_iter().flat_map(|e| e.into_iter()).collect_vec())
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(|e| e.into_iter())),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    pub fn archive<P: Into<PathBuf>>(path: P, error: Error) -> Error {
        Error::Archive {
            path: path.into(),
            error: Box::new(error),
        }
    }

    pub fn lookup<S: Into<String>>(key: S, error: Error) -> Error {
        Error::Lookup {
            key: key.into(),
            error: Box::new(error),
        }
    }

    pub fn deletion<S: Into<String>>(key: S, error: Error) -> Error {
        Error::Deletion {
            key: key.into(),
            error: Box::new(error),
        }
    }

    /// Whether this error, or the first error it wraps, is a precondition failure.
    pub fn is_precondition(&self) -> bool {
        match self {
            Error::Precondition(_) => true,
            Error::WithMsg { error, .. }
            | Error::WithDebugObjAndFnName { error, .. }
            | Error::WithFnName { error, .. } => error.is_precondition(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found(msg: &str) -> Error {
        Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, msg.to_string()))
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::from(io_error);

        match error {
            Error::Io(_) => (),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_with_msg() {
        let error_with_msg = not_found("file not found").with_msg("Custom message");

        match error_with_msg {
            Error::WithMsg { msg, .. } => assert_eq!(msg, "Custom message"),
            _ => panic!("Expected WithMsg error"),
        }
    }

    #[test]
    fn test_error_with_debug_object_and_fn_name() {
        let error_with_debug =
            not_found("file not found").with_debug_object_and_fn_name("test_object", "test_function");

        match error_with_debug {
            Error::WithDebugObjAndFnName { fn_name, .. } => assert_eq!(fn_name, "test_function"),
            _ => panic!("Expected WithDebugObjAndFnName error"),
        }
    }

    #[test]
    fn test_error_from_vec_flattens() {
        let nested = not_found("error1").chain(not_found("error2"));
        let combined_error = Error::from(vec![nested, not_found("error3")]);
        match combined_error {
            Error::LotsOfError(error_vec) => assert_eq!(error_vec.len(), 3),
            _ => panic!("Expected LotsOfError"),
        }
    }

    #[test]
    #[should_panic(expected = "Should not create lots of errors when error is empty")]
    fn test_error_from_empty_vec_panics() {
        let errors: Vec<Error> = vec![];
        let _error = Error::from(errors);
    }

    #[test]
    fn test_error_into_iter() {
        let mut iter = not_found("test").into_iter();

        assert!(iter.next().is_some());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_deletion_display_names_key() {
        let error = Error::deletion("host/data/backup-20261018T120000Z", not_found("gone"));
        let error_str = error.to_string();

        assert!(error_str.contains("backup-20261018T120000Z"));
        assert!(error_str.contains("  gone"));
    }

    #[test]
    fn test_is_precondition_sees_through_context() {
        let error = Error::Precondition("no machine id".into())
            .with_msg("Resolve host context failed")
            .with_fn_name("run_backup");
        assert!(error.is_precondition());
        assert!(!Error::archive("/data", not_found("gone")).is_precondition());
    }
}
