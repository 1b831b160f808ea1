//! Core traits for Shopfloor data-source abstraction.
//!
//! The primary trait is [`DataSource`], which abstracts where the domain
//! documents live. The CLI configuration implements it; tests usually use
//! the blanket implementation for [`PathBuf`].

use std::path::PathBuf;

use crate::Result;

/// Trait for resolving where domain documents are stored.
///
/// # Bounds
///
/// - `Send + Sync`: Sources are shared across request handlers
/// - `Clone`: Sources can be handed to subsystems by value
/// - `'static`: Source lifetime is not borrowed
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
/// use shopfloor_core::traits::DataSource;
/// use shopfloor_core::Result;
///
/// #[derive(Clone)]
/// struct PlantData {
///     root: PathBuf,
/// }
///
/// impl DataSource for PlantData {
///     fn project_name(&self) -> &str {
///         "wind-turbine-plant"
///     }
///
///     fn data_dir(&self) -> Result<PathBuf> {
///         Ok(self.root.clone())
///     }
/// }
///
/// let source = PlantData { root: PathBuf::from("/srv/plant") };
/// assert_eq!(
///     source.document_path("cmms/maintenance_data.json").unwrap(),
///     PathBuf::from("/srv/plant/cmms/maintenance_data.json")
/// );
/// ```
pub trait DataSource: Send + Sync + Clone + 'static {
    /// The project name, used in log lines and `/info` metadata.
    fn project_name(&self) -> &str;

    /// Root directory holding every domain document.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be determined.
    fn data_dir(&self) -> Result<PathBuf>;

    /// Absolute path of a document, given its path relative to the root.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`DataSource::data_dir`].
    fn document_path(&self, relative: &str) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(relative))
    }
}

impl DataSource for PathBuf {
    fn project_name(&self) -> &str {
        "shopfloor"
    }

    fn data_dir(&self) -> Result<PathBuf> {
        Ok(self.clone())
    }
}
