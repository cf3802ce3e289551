//! The byte sink every kernel text output ends up in.

use core::fmt;

/// A device that accepts one byte at a time.
///
/// Writes are best effort: a device that cannot accept a byte drops it.
pub trait WriteByte {
    fn write_byte(&self, byte: u8);

    #[inline]
    fn write_bytes(&self, bytes: &[u8]) {
        for &b in bytes {
            self.write_byte(b);
        }
    }
}

impl<W: WriteByte + ?Sized> WriteByte for &W {
    #[inline]
    fn write_byte(&self, byte: u8) {
        (**self).write_byte(byte);
    }

    #[inline]
    fn write_bytes(&self, bytes: &[u8]) {
        (**self).write_bytes(bytes);
    }
}

/// Adapts a [`WriteByte`] to [`fmt::Write`].
pub struct ByteWriter<'a, W: WriteByte + ?Sized> {
    sink: &'a W,
}

impl<'a, W: WriteByte + ?Sized> ByteWriter<'a, W> {
    #[must_use]
    pub const fn new(sink: &'a W) -> Self {
        Self { sink }
    }
}

impl<W: WriteByte + ?Sized> fmt::Write for ByteWriter<'_, W> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.sink.write_bytes(s.as_bytes());
        Ok(())
    }
}

/// Sends every byte to a primary sink and, if present, a mirror.
#[derive(Clone, Copy)]
pub struct LogChannel<'a> {
    primary: &'a (dyn WriteByte + Sync),
    mirror: Option<&'a (dyn WriteByte + Sync)>,
}

impl<'a> LogChannel<'a> {
    #[must_use]
    pub const fn new(primary: &'a (dyn WriteByte + Sync)) -> Self {
        Self {
            primary,
            mirror: None,
        }
    }

    #[must_use]
    pub const fn with_mirror(self, mirror: &'a (dyn WriteByte + Sync)) -> Self {
        Self {
            mirror: Some(mirror),
            ..self
        }
    }
}

impl WriteByte for LogChannel<'_> {
    fn write_byte(&self, byte: u8) {
        self.primary.write_byte(byte);
        if let Some(mirror) = self.mirror {
            mirror.write_byte(byte);
        }
    }

    fn write_bytes(&self, bytes: &[u8]) {
        self.primary.write_bytes(bytes);
        if let Some(mirror) = self.mirror {
            mirror.write_bytes(bytes);
        }
    }
}

impl fmt::Debug for LogChannel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogChannel")
            .field("mirrored", &self.mirror.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::WriteByte;
    use std::sync::Mutex;

    /// Collects everything written to it.
    pub struct Capture(pub Mutex<Vec<u8>>);

    impl Capture {
        pub const fn new() -> Self {
            Self(Mutex::new(Vec::new()))
        }

        pub fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl WriteByte for Capture {
        fn write_byte(&self, byte: u8) {
            self.0.lock().unwrap().push(byte);
        }
    }
}
