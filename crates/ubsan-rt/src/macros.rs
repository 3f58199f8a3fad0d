use core::ffi::CStr;
use core::fmt;

use ubsan_abi::SourceLocation;

/// Format one diagnostic on the stack and hand it to the sink.
///
/// ```ignore
/// ubsan_report!(fatal, ReportKind::OutOfBounds, &data.loc,
///     "index {} is out of range for type {}", index, array_name);
/// ```
///
/// Expands to the standard `UBSan: Undefined Behavior in <loc>, ` prefix, the
/// formatted body and a newline; records it as the last report; then emits.
/// A body too long for the buffer is cut short, never the newline.
/// Diverges when `fatal` is true or the policy asks for an abort.
#[macro_export]
macro_rules! ubsan_report {
    ($fatal:expr, $kind:expr, $loc:expr, $($arg:tt)*) => {{
        use core::fmt::Write as _;
        let loc: &ubsan_abi::SourceLocation = $loc;
        let mut buf = [0u8; $crate::MESSAGE_MAX];
        let mut writer = $crate::macros::StackWriter::new(&mut buf);
        let _ = write!(
            writer,
            "UBSan: Undefined Behavior in {}, ",
            $crate::macros::LocationDisplay(loc)
        );
        let body = writer.len();
        let _ = write!(writer, $($arg)*);
        $crate::report::record($kind, loc, writer.tail(body));
        writer.end_line();
        $crate::sink::emit($fatal, &writer);
    }};
}

/// Fixed-capacity `fmt::Write` target over a caller-provided buffer.
///
/// Output past the end is dropped at a UTF-8 boundary. The byte after the
/// written text is always NUL, so the contents can be handed to C
/// formatting primitives as-is.
pub struct StackWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> StackWriter<'a> {
    /// `buf` must hold at least one byte (the terminator).
    pub fn new(buf: &'a mut [u8]) -> Self {
        if let Some(first) = buf.first_mut() {
            *first = 0;
        }
        Self { buf, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(self.as_bytes()).unwrap_or("")
    }

    /// Text written since byte offset `from`.
    pub fn tail(&self, from: usize) -> &str {
        self.as_str().get(from..).unwrap_or("")
    }

    pub fn as_c_str(&self) -> &CStr {
        CStr::from_bytes_until_nul(&self.buf[..=self.pos.min(self.buf.len().saturating_sub(1))])
            .unwrap_or(c"")
    }

    /// Append a newline, dropping trailing characters if the buffer is full.
    pub fn end_line(&mut self) {
        let capacity = self.capacity();
        if capacity == 0 {
            return;
        }
        if self.pos >= capacity {
            let mut end = capacity - 1;
            while end > 0 && self.buf[end] & 0xC0 == 0x80 {
                end -= 1;
            }
            self.pos = end;
        }
        self.buf[self.pos] = b'\n';
        self.pos += 1;
        self.buf[self.pos] = 0;
    }

    fn capacity(&self) -> usize {
        self.buf.len().saturating_sub(1)
    }
}

impl fmt::Write for StackWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let remaining = self.capacity().saturating_sub(self.pos);
        let mut to_copy = s.len().min(remaining);
        while !s.is_char_boundary(to_copy) {
            to_copy -= 1;
        }
        self.buf[self.pos..self.pos + to_copy].copy_from_slice(&s.as_bytes()[..to_copy]);
        self.pos += to_copy;
        if let Some(terminator) = self.buf.get_mut(self.pos) {
            *terminator = 0;
        }
        Ok(())
    }
}

/// Displays a C string, replacing invalid UTF-8 with U+FFFD.
pub struct CStrDisplay<'a>(pub &'a CStr);

impl fmt::Display for CStrDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for chunk in self.0.to_bytes().utf8_chunks() {
            f.write_str(chunk.valid())?;
            if !chunk.invalid().is_empty() {
                f.write_str("\u{FFFD}")?;
            }
        }
        Ok(())
    }
}

/// `file:line:column`, with the reported flag masked out of the line.
pub struct LocationDisplay<'a>(pub &'a SourceLocation);

impl fmt::Display for LocationDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match unsafe { self.0.filename() } {
            Some(name) => write!(f, "{}", CStrDisplay(name))?,
            None => f.write_str("<unknown>")?,
        }
        write!(f, ":{}:{}", self.0.line(), self.0.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    #[test]
    fn test_writer_terminates_and_truncates() {
        let mut buf = [0xffu8; 8];
        let mut w = StackWriter::new(&mut buf);
        write!(w, "hello world").unwrap();
        assert_eq!(w.as_str(), "hello w");
        assert_eq!(w.as_c_str(), c"hello w");
        assert_eq!(w.len(), 7);
    }

    #[test]
    fn test_writer_truncates_on_char_boundary() {
        let mut buf = [0u8; 5];
        let mut w = StackWriter::new(&mut buf);
        w.write_str("aé").unwrap();
        // One byte of room left, 'é' needs two.
        w.write_str("éé").unwrap();
        assert_eq!(w.as_str(), "aé");
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn test_end_line_always_fits() {
        let mut buf = [0u8; 16];
        let mut w = StackWriter::new(&mut buf);
        w.write_str("hi").unwrap();
        w.end_line();
        assert_eq!(w.as_str(), "hi\n");

        let mut buf = [0u8; 8];
        let mut w = StackWriter::new(&mut buf);
        write!(w, "hello world").unwrap();
        w.end_line();
        assert_eq!(w.as_str(), "hello \n");
        assert_eq!(w.as_c_str(), c"hello \n");
    }

    #[test]
    fn test_end_line_backs_up_to_char_start() {
        let mut buf = [0u8; 6];
        let mut w = StackWriter::new(&mut buf);
        w.write_str("abcé").unwrap();
        assert_eq!(w.len(), 5);
        w.end_line();
        assert_eq!(w.as_str(), "abc\n");
    }

    #[test]
    fn test_writer_tail() {
        let mut buf = [0u8; 32];
        let mut w = StackWriter::new(&mut buf);
        w.write_str("prefix, ").unwrap();
        let mark = w.len();
        w.write_str("body").unwrap();
        assert_eq!(w.tail(mark), "body");
        assert_eq!(w.tail(100), "");
    }

    #[test]
    fn test_location_display_masks_flag() {
        let loc = SourceLocation::new(c"prog.c", 10, 5);
        loc.claim();
        let mut buf = [0u8; 64];
        let mut w = StackWriter::new(&mut buf);
        write!(w, "{}", LocationDisplay(&loc)).unwrap();
        assert_eq!(w.as_str(), "prog.c:10:5");
    }

    #[test]
    fn test_location_without_file() {
        let loc = SourceLocation::unknown();
        let mut buf = [0u8; 64];
        let mut w = StackWriter::new(&mut buf);
        write!(w, "{}", LocationDisplay(&loc)).unwrap();
        assert_eq!(w.as_str(), "<unknown>:0:0");
    }

    #[test]
    fn test_cstr_display_replaces_invalid_utf8() {
        let raw = CStr::from_bytes_with_nul(b"a\xffb\0").unwrap();
        let mut buf = [0u8; 16];
        let mut w = StackWriter::new(&mut buf);
        write!(w, "{}", CStrDisplay(raw)).unwrap();
        assert_eq!(w.as_str(), "a\u{FFFD}b");
    }
}
