//! Template acquisition for stencil.
//! Turns a template location (local path, `file://` URL or git repository with
//! optional `//sub/dir` and `?ref=` qualifiers) into a local directory.
use crate::error::{Error, Result};
use crate::logger::Logger;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use url::Url;

/// Prefix forcing a location to be treated as a git repository.
const GIT_FORCE_PREFIX: &str = "git::";

/// Represents the source location of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Local filesystem template path
    FileSystem(PathBuf),
    /// Git repository URL (HTTPS or SSH)
    Git {
        repo: String,
        subdir: Option<String>,
        reference: Option<String>,
    },
}

impl std::fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateSource::FileSystem(path) => {
                write!(f, "local path: '{}'", path.display())
            }
            TemplateSource::Git { repo, reference, .. } => match reference {
                Some(reference) => write!(f, "git repository: '{repo}' at '{reference}'"),
                None => write!(f, "git repository: '{repo}'"),
            },
        }
    }
}

/// Whether `s` names a git repository rather than a local path.
pub fn is_git_url(s: &str) -> bool {
    if s.starts_with(GIT_FORCE_PREFIX) || s.starts_with("git@") {
        return true;
    }
    match Url::parse(s) {
        Ok(url) => matches!(url.scheme(), "https" | "http" | "git" | "ssh"),
        Err(_) => false,
    }
}

/// Splits `//sub/dir` and `?ref=` qualifiers off a git location.
fn split_git_location(s: &str) -> (String, Option<String>, Option<String>) {
    let s = s.strip_prefix(GIT_FORCE_PREFIX).unwrap_or(s);

    let (base, query) = match s.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (s, None),
    };
    let reference = query.and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "ref")
            .map(|(_, value)| value.into_owned())
    });

    let search_from = base.find("://").map(|i| i + 3).unwrap_or(0);
    let (repo, subdir) = match base[search_from..].find("//") {
        Some(i) => {
            let split = search_from + i;
            let subdir = base[split + 2..].trim_matches('/');
            (
                base[..split].to_string(),
                (!subdir.is_empty()).then(|| subdir.to_string()),
            )
        }
        None => (base.to_string(), None),
    };
    (repo, subdir, reference)
}

impl TemplateSource {
    /// Creates a TemplateSource from a string path or URL.
    pub fn from_string(s: &str) -> Self {
        if let Some(path) = s.strip_prefix("file://") {
            return Self::FileSystem(PathBuf::from(path));
        }
        if is_git_url(s) {
            let (repo, subdir, reference) = split_git_location(s);
            return Self::Git { repo, subdir, reference };
        }
        Self::FileSystem(PathBuf::from(s))
    }
}

/// Resolves a dependency's template location against the folder of the
/// template that declares it. Relative local paths are joined to `base`;
/// absolute paths and remote locations are returned unchanged.
pub fn resolve_location(base: &Path, location: &str) -> String {
    match TemplateSource::from_string(location) {
        TemplateSource::FileSystem(path) if path.is_relative() && !location.starts_with("file://") => {
            base.join(path).display().to_string()
        }
        _ => location.to_string(),
    }
}

/// A template tree available on the local file system.
///
/// Remote templates are cloned into a temporary directory that is removed
/// when this value is dropped.
#[derive(Debug)]
pub struct LoadedTemplate {
    root: PathBuf,
    _workdir: Option<TempDir>,
}

impl LoadedTemplate {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Trait for loading templates from different sources.
pub trait TemplateLoader {
    /// Makes the template available locally.
    fn load(&self) -> Result<LoadedTemplate>;
}

/// Loader for templates from the local filesystem.
pub struct LocalLoader<P: AsRef<Path>> {
    path: P,
}

impl<P: AsRef<Path>> LocalLoader<P> {
    /// Creates a new LocalLoader instance.
    pub fn new(path: P) -> Self {
        Self { path }
    }
}

impl<P: AsRef<Path>> TemplateLoader for LocalLoader<P> {
    /// # Errors
    /// * `Error::TemplateDoesNotExist` if the path is not a directory
    fn load(&self) -> Result<LoadedTemplate> {
        let path = self.path.as_ref();
        if !path.is_dir() {
            return Err(Error::TemplateDoesNotExist(path.display().to_string()));
        }
        let root = std::path::absolute(path)?;
        Ok(LoadedTemplate { root, _workdir: None })
    }
}

/// Loader for templates from git repositories.
pub struct GitLoader<S: AsRef<str>> {
    repo: S,
    subdir: Option<String>,
    reference: Option<String>,
    logger: Logger,
}

impl<S: AsRef<str>> GitLoader<S> {
    /// Creates a new GitLoader instance.
    pub fn new(repo: S, subdir: Option<String>, reference: Option<String>) -> Self {
        Self { repo, subdir, reference, logger: Logger::noop() }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    fn checkout(repo: &git2::Repository, reference: &str) -> Result<()> {
        let object = repo
            .revparse_single(reference)
            .or_else(|_| repo.revparse_single(&format!("origin/{reference}")))?;
        repo.checkout_tree(&object, Some(git2::build::CheckoutBuilder::new().force()))?;
        repo.set_head_detached(object.peel_to_commit()?.id())?;
        Ok(())
    }
}

impl<S: AsRef<str>> TemplateLoader for GitLoader<S> {
    /// # Errors
    /// * `Error::Git2Error` if the clone or checkout fails
    /// * `Error::TemplateDoesNotExist` if the sub directory is missing
    fn load(&self) -> Result<LoadedTemplate> {
        let repo_url = self.repo.as_ref();
        let workdir = tempfile::tempdir()?;

        self.logger
            .debug(format!("Cloning repository '{}' to '{}'.", repo_url, workdir.path().display()));

        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(|_url, username_from_url, allowed_types| {
            let username = username_from_url.unwrap_or("git");
            if allowed_types.contains(git2::CredentialType::SSH_KEY) {
                let home = std::env::var("HOME").unwrap_or_default();
                git2::Cred::ssh_key(
                    username,
                    None,
                    &Path::new(&home).join(".ssh").join("id_rsa"),
                    None,
                )
            } else {
                git2::Cred::default()
            }
        });

        let mut fetch_opts = git2::FetchOptions::new();
        fetch_opts.remote_callbacks(callbacks);

        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(fetch_opts);
        let repo = builder.clone(repo_url, workdir.path())?;

        if let Some(reference) = &self.reference {
            self.logger.debug(format!("Checking out '{reference}'."));
            Self::checkout(&repo, reference)?;
        }

        let root = match &self.subdir {
            Some(subdir) => workdir.path().join(subdir),
            None => workdir.path().to_path_buf(),
        };
        if !root.is_dir() {
            return Err(Error::TemplateDoesNotExist(format!(
                "{repo_url}//{}",
                self.subdir.as_deref().unwrap_or_default()
            )));
        }
        Ok(LoadedTemplate { root, _workdir: Some(workdir) })
    }
}

/// Makes the template at `location` available locally.
pub fn load_template(location: &str, logger: &Logger) -> Result<LoadedTemplate> {
    let template_source = TemplateSource::from_string(location);
    logger.debug(format!("Using template from the {template_source}"));

    let loader: Box<dyn TemplateLoader> = match template_source {
        TemplateSource::Git { repo, subdir, reference } => {
            Box::new(GitLoader::new(repo, subdir, reference).with_logger(logger.clone()))
        }
        TemplateSource::FileSystem(path) => Box::new(LocalLoader::new(path)),
    };

    loader.load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_source_display() {
        let fs_source = TemplateSource::FileSystem(PathBuf::from("/path/to/template"));
        assert_eq!(format!("{}", fs_source), "local path: '/path/to/template'");

        let git_source = TemplateSource::from_string("git@github.com:user/repo");
        assert_eq!(format!("{}", git_source), "git repository: 'git@github.com:user/repo'");
    }

    #[test]
    fn test_split_git_location() {
        let (repo, subdir, reference) =
            split_git_location("git::https://github.com/org/repo.git//templates/app?ref=v1.2.0");
        assert_eq!(repo, "https://github.com/org/repo.git");
        assert_eq!(subdir.as_deref(), Some("templates/app"));
        assert_eq!(reference.as_deref(), Some("v1.2.0"));

        let (repo, subdir, reference) = split_git_location("git@github.com:org/repo.git");
        assert_eq!(repo, "git@github.com:org/repo.git");
        assert_eq!(subdir, None);
        assert_eq!(reference, None);
    }
}
