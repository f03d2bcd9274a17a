//! Filesystem job kinds: directory and text-file operations.
//!
//! Each kind performs its I/O synchronously inside [`Work::begin`] and
//! completes with `true` (or the file contents for reads). I/O errors
//! propagate out of `begin` and fail the job through the generic
//! internal-error path.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::job::{Job, JobOptions, Value, Work};

struct CreateDirectory {
    path: PathBuf,
}

impl Work for CreateDirectory {
    fn begin(&self, job: &Arc<Job>) -> anyhow::Result<()> {
        fs::create_dir_all(&self.path)?;
        info!(path = %self.path.display(), "directory created");
        job.notify_complete(Value::Bool(true))?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "create-directory"
    }
}

struct RemoveDirectory {
    path: PathBuf,
    recursive: bool,
}

impl Work for RemoveDirectory {
    fn begin(&self, job: &Arc<Job>) -> anyhow::Result<()> {
        if self.recursive {
            fs::remove_dir_all(&self.path)?;
        } else {
            fs::remove_dir(&self.path)?;
        }
        info!(path = %self.path.display(), "directory removed");
        job.notify_complete(Value::Bool(true))?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "remove-directory"
    }
}

struct WriteTextFile {
    path: PathBuf,
    text: String,
    append: bool,
}

impl Work for WriteTextFile {
    fn begin(&self, job: &Arc<Job>) -> anyhow::Result<()> {
        if self.append {
            let mut file = fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
            file.write_all(self.text.as_bytes())?;
        } else {
            fs::write(&self.path, &self.text)?;
        }
        info!(path = %self.path.display(), "file updated");
        job.notify_complete(Value::Bool(true))?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "write-text-file"
    }
}

struct ReadTextFile {
    path: PathBuf,
}

impl Work for ReadTextFile {
    fn begin(&self, job: &Arc<Job>) -> anyhow::Result<()> {
        let text = fs::read_to_string(&self.path)?;
        info!(path = %self.path.display(), bytes = text.len(), "file read");
        job.notify_complete(Value::String(text))?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "read-text-file"
    }
}

struct RemoveFile {
    path: PathBuf,
}

impl Work for RemoveFile {
    fn begin(&self, job: &Arc<Job>) -> anyhow::Result<()> {
        // Removing a file that is already gone counts as success.
        if self.path.is_file() {
            fs::remove_file(&self.path)?;
        }
        info!(path = %self.path.display(), "file removed");
        job.notify_complete(Value::Bool(true))?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "remove-file"
    }
}

impl Job {
    /// Creates a job that creates the directory (and missing parents).
    pub fn create_directory(path: impl Into<PathBuf>, options: JobOptions) -> Arc<Self> {
        Self::with_work(CreateDirectory { path: path.into() }, options)
    }

    /// Creates a job that removes the directory; `recursive` removes its
    /// contents too.
    pub fn remove_directory(path: impl Into<PathBuf>, recursive: bool, options: JobOptions) -> Arc<Self> {
        Self::with_work(
            RemoveDirectory {
                path: path.into(),
                recursive,
            },
            options,
        )
    }

    /// Creates a job that writes (or appends) UTF-8 text to the file.
    pub fn write_text_file(
        path: impl Into<PathBuf>,
        text: impl Into<String>,
        append: bool,
        options: JobOptions,
    ) -> Arc<Self> {
        Self::with_work(
            WriteTextFile {
                path: path.into(),
                text: text.into(),
                append,
            },
            options,
        )
    }

    /// Creates a job that reads the file and completes with its text.
    pub fn read_text_file(path: impl Into<PathBuf>, options: JobOptions) -> Arc<Self> {
        Self::with_work(ReadTextFile { path: path.into() }, options)
    }

    /// Creates a job that removes the file if it exists.
    pub fn remove_file(path: impl Into<PathBuf>, options: JobOptions) -> Arc<Self> {
        Self::with_work(RemoveFile { path: path.into() }, options)
    }
}
