//! Module paths: the key sequence from the root module to a nested module.

use std::fmt;

/// Errors related to path parsing and validation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// A path component is not a valid module key.
    #[error("invalid module key '{component}' at position {position}: {message}")]
    InvalidComponent {
        component: String,
        position: usize,
        message: String,
    },
}

/// A validated module path.
///
/// Components are any non-empty strings without `/`. The same components address the module in the registry and its
/// state in the global state tree.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Path {
    pub(crate) components: Vec<String>,
}

impl Path {
    /// The root module path.
    pub fn root() -> Self {
        Path::default()
    }

    /// Parse a `/`-separated path string, validating components.
    ///
    /// Empty components are ignored, so `""` is the root path and
    /// `"foo//bar/"` is the same as `"foo/bar"`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use smartstore_engine::Path;
    ///
    /// let path = Path::parse("foo/bar").unwrap();
    /// assert_eq!(path.len(), 2);
    /// assert!(Path::parse("").unwrap().is_root());
    /// ```
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let components: Vec<String> = s
            .split('/')
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .collect();

        for (i, component) in components.iter().enumerate() {
            Self::validate_component(component, i)?;
        }

        Ok(Path { components })
    }

    fn validate_component(component: &str, position: usize) -> Result<(), PathError> {
        let invalid = |message: &str| PathError::InvalidComponent {
            component: component.to_string(),
            position,
            message: message.to_string(),
        };

        if component.is_empty() {
            return Err(invalid("empty key"));
        }
        if component.contains('/') {
            return Err(invalid("'/' separates module keys"));
        }
        Ok(())
    }

    /// True for the root module path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.components.iter()
    }

    /// The path of the child module `key`.
    pub fn child(&self, key: &str) -> Result<Path, PathError> {
        Self::validate_component(key, self.components.len())?;
        let mut components = self.components.clone();
        components.push(key.to_string());
        Ok(Path { components })
    }

    /// The parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        let (_, rest) = self.components.split_last()?;
        Some(Path {
            components: rest.to_vec(),
        })
    }

    /// The last key, or `None` for the root.
    pub fn last(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join("/"))
    }
}

/// Macro for creating paths from literals.
///
/// # Example
///
/// ```rust
/// use smartstore_engine::path;
///
/// let p = path!("foo/bar");
/// assert_eq!(p.len(), 2);
/// ```
#[macro_export]
macro_rules! path {
    ($s:expr) => {
        $crate::Path::parse($s).expect("invalid path literal")
    };
}
