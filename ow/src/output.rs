use std::{
    io::{self, Write},
    sync::Arc,
};

use parking_lot::Mutex;

/// Byte sink that can be handed to a machine and read back by the host.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().clone()
    }

    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Where the `print` native writes.
#[derive(Debug, Clone, Default)]
pub enum Output {
    #[default]
    Stdout,
    Stderr,
    Shared(SharedBuffer),
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout => io::stdout().lock().write(buf),
            Output::Stderr => io::stderr().lock().write(buf),
            Output::Shared(buffer) => buffer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout => io::stdout().lock().flush(),
            Output::Stderr => io::stderr().lock().flush(),
            Output::Shared(buffer) => buffer.flush(),
        }
    }
}
