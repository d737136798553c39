use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use std::io::{self, Read};
use std::process::{Child, ChildStdout};

/// Executables tried, in order, to list a container's environment.
pub const ENV_EXECUTABLES: &[&str] = &["/usr/bin/env", "/bin/env"];

/// The container runtime the image is converted from.
pub trait SourceRuntime {
    /// Returns the name of the runtime for identification purposes
    fn name(&self) -> &str;

    /// Starts a detached instance of `image` and returns its id.
    fn start(&self, image: &str) -> Result<String>;

    /// Raw JSON of `inspect` on a running instance.
    fn inspect_container(&self, container_id: &str) -> Result<String>;

    /// Raw JSON of `inspect` on an image.
    fn inspect_image(&self, image: &str) -> Result<String>;

    /// Streams the instance's filesystem as a tar archive.
    fn export(&self, container_id: &str) -> Result<FilesystemStream>;

    /// Runs `executable` as the entrypoint of a throwaway instance of `image`
    /// and returns its output lines.
    fn run_executable(&self, image: &str, executable: &str) -> Result<Vec<String>>;

    fn stop(&self, container_id: &str) -> Result<()>;

    fn remove(&self, container_id: &str) -> Result<()>;

    /// Lists the image's default environment, trying each of
    /// [`ENV_EXECUTABLES`]. An image where none of them works yields an
    /// empty listing.
    fn environment(&self, image: &str) -> Vec<String> {
        for executable in ENV_EXECUTABLES {
            match self.run_executable(image, executable) {
                Ok(lines) => {
                    debug!("Read {} variables with {}", lines.len(), executable);
                    return lines;
                }
                Err(e) => debug!("Could not list environment with {}: {:#}", executable, e),
            }
        }
        warn!(
            "Unable to list the environment of {}, no variables will be exported",
            image
        );
        Vec::new()
    }
}

/// Tar stream of an exported filesystem.
///
/// When backed by a child process, [`FilesystemStream::finish`] must be called
/// after the stream is consumed to check the exit status.
pub struct FilesystemStream {
    reader: Box<dyn Read>,
    child: Option<Child>,
}

impl FilesystemStream {
    pub fn from_reader<R: Read + 'static>(reader: R) -> Self {
        Self {
            reader: Box::new(reader),
            child: None,
        }
    }

    pub fn from_child(mut child: Child) -> Result<Self> {
        let stdout: ChildStdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Export process has no stdout"))?;
        Ok(Self {
            reader: Box::new(stdout),
            child: Some(child),
        })
    }

    pub fn finish(self) -> Result<()> {
        // Close our end first so a producer blocked on a full pipe can exit.
        drop(self.reader);
        if let Some(mut child) = self.child {
            let status = child.wait().context("Failed to wait for export process")?;
            if !status.success() {
                return Err(anyhow!("Export process failed with {}", status));
            }
        }
        Ok(())
    }
}

impl Read for FilesystemStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

/// A started source instance. Stopped and removed on drop unless
/// [`RunningInstance::teardown`] already did it.
pub struct RunningInstance<'a, S: SourceRuntime + ?Sized> {
    runtime: &'a S,
    id: String,
    torn_down: bool,
}

impl<'a, S: SourceRuntime + ?Sized> RunningInstance<'a, S> {
    pub fn start(runtime: &'a S, image: &str) -> Result<Self> {
        let id = runtime.start(image)?;
        Ok(Self {
            runtime,
            id,
            torn_down: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn teardown(mut self) -> Result<()> {
        self.torn_down = true;
        self.runtime.stop(&self.id)?;
        self.runtime.remove(&self.id)
    }
}

impl<S: SourceRuntime + ?Sized> Drop for RunningInstance<'_, S> {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        debug!("Discarding instance {} after an aborted conversion", self.id);
        if let Err(e) = self
            .runtime
            .stop(&self.id)
            .and_then(|_| self.runtime.remove(&self.id))
        {
            warn!("Failed to clean up instance {}: {:#}", self.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Cursor;

    #[derive(Default)]
    struct FakeRuntime {
        env_paths_that_work: Vec<&'static str>,
        calls: RefCell<Vec<String>>,
    }

    impl SourceRuntime for FakeRuntime {
        fn name(&self) -> &str {
            "fake"
        }

        fn start(&self, image: &str) -> Result<String> {
            self.calls.borrow_mut().push(format!("start {}", image));
            Ok("abc".to_string())
        }

        fn inspect_container(&self, _container_id: &str) -> Result<String> {
            Ok("[]".to_string())
        }

        fn inspect_image(&self, _image: &str) -> Result<String> {
            Ok("[]".to_string())
        }

        fn export(&self, _container_id: &str) -> Result<FilesystemStream> {
            Ok(FilesystemStream::from_reader(Cursor::new(Vec::new())))
        }

        fn run_executable(&self, _image: &str, executable: &str) -> Result<Vec<String>> {
            self.calls.borrow_mut().push(format!("run {}", executable));
            if self.env_paths_that_work.iter().any(|path| *path == executable) {
                Ok(vec![format!("FROM={}", executable)])
            } else {
                Err(anyhow!("no such file"))
            }
        }

        fn stop(&self, container_id: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("stop {}", container_id));
            Ok(())
        }

        fn remove(&self, container_id: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("rm {}", container_id));
            Ok(())
        }
    }

    #[test]
    fn test_environment_uses_first_working_executable() {
        let runtime = FakeRuntime {
            env_paths_that_work: vec!["/usr/bin/env", "/bin/env"],
            ..Default::default()
        };
        assert_eq!(runtime.environment("img"), vec!["FROM=/usr/bin/env"]);
        assert_eq!(*runtime.calls.borrow(), vec!["run /usr/bin/env"]);
    }

    #[test]
    fn test_environment_falls_back_to_second_executable() {
        let runtime = FakeRuntime {
            env_paths_that_work: vec!["/bin/env"],
            ..Default::default()
        };
        assert_eq!(runtime.environment("img"), vec!["FROM=/bin/env"]);
    }

    #[test]
    fn test_environment_degrades_to_empty() {
        let runtime = FakeRuntime::default();
        assert!(runtime.environment("img").is_empty());
        assert_eq!(runtime.calls.borrow().len(), 2);
    }

    #[test]
    fn test_instance_cleaned_up_on_drop() {
        let runtime = FakeRuntime::default();
        {
            let instance = RunningInstance::start(&runtime, "img").unwrap();
            assert_eq!(instance.id(), "abc");
        }
        assert_eq!(*runtime.calls.borrow(), vec!["start img", "stop abc", "rm abc"]);
    }

    #[test]
    fn test_explicit_teardown_happens_once() {
        let runtime = FakeRuntime::default();
        let instance = RunningInstance::start(&runtime, "img").unwrap();
        instance.teardown().unwrap();
        assert_eq!(*runtime.calls.borrow(), vec!["start img", "stop abc", "rm abc"]);
    }

    #[test]
    fn test_reader_stream_finishes_cleanly() {
        let mut stream = FilesystemStream::from_reader(Cursor::new(b"data".to_vec()));
        let mut content = String::new();
        stream.read_to_string(&mut content).unwrap();
        assert_eq!(content, "data");
        assert!(stream.finish().is_ok());
    }
}
