use std::fmt::Write as _;
use std::mem;

/// Cursor over a slot payload being written by a producer.
///
/// Offsets are packed: values land at the current position with no
/// alignment padding. Callers check `LogArguments::encoded_len` against the
/// payload capacity before encoding, so the cursor itself never overflows.
pub struct PayloadWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> PayloadWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn written(&self) -> usize {
        self.pos
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn put_byte(&mut self, byte: u8) {
        self.buf[self.pos] = byte;
        self.pos += 1;
    }
}

/// Cursor over a slot payload being decoded by the drainer.
pub struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> &'a [u8] {
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        bytes
    }

    /// Consumes bytes up to and including the next null terminator and
    /// returns the bytes before it.
    fn take_until_nul(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        match rest.iter().position(|&b| b == 0) {
            Some(end) => {
                self.pos += end + 1;
                &rest[..end]
            }
            None => {
                self.pos = self.data.len();
                rest
            }
        }
    }
}

/// A value that can be copied into a slot payload by a producer and decoded
/// back into its `Display` rendering by the drainer.
///
/// `TAG` identifies the type in a formatter's argument tuple; the encoded
/// stream carries no per-value tags, so producer and consumer must agree on
/// the type sequence through the formatter.
pub trait Loggable {
    const TAG: u8;
    fn encoded_len(&self) -> usize;
    fn encode(&self, writer: &mut PayloadWriter<'_>);
    fn decode(reader: &mut PayloadReader<'_>, out: &mut String);
}

macro_rules! scalar_loggable {
    ($($ty:ty => $tag:expr),* $(,)?) => {$(
        impl Loggable for $ty {
            const TAG: u8 = $tag;

            #[inline]
            fn encoded_len(&self) -> usize {
                mem::size_of::<$ty>()
            }

            #[inline]
            fn encode(&self, writer: &mut PayloadWriter<'_>) {
                writer.put(bytemuck::bytes_of(self));
            }

            fn decode(reader: &mut PayloadReader<'_>, out: &mut String) {
                let value: $ty = bytemuck::pod_read_unaligned(reader.take(mem::size_of::<$ty>()));
                let _ = write!(out, "{}", value);
            }
        }
    )*};
}

scalar_loggable! {
    u8 => 1, u16 => 2, u32 => 3, u64 => 4, u128 => 5, usize => 6,
    i8 => 7, i16 => 8, i32 => 9, i64 => 10, i128 => 11, isize => 12,
    f32 => 13, f64 => 14,
}

impl Loggable for bool {
    const TAG: u8 = 0;

    #[inline]
    fn encoded_len(&self) -> usize {
        1
    }

    #[inline]
    fn encode(&self, writer: &mut PayloadWriter<'_>) {
        writer.put_byte(*self as u8);
    }

    fn decode(reader: &mut PayloadReader<'_>, out: &mut String) {
        out.push_str(if reader.take(1)[0] != 0 { "true" } else { "false" });
    }
}

/// Length of the string bytes actually encoded: everything before the first
/// interior null. Strings containing null bytes are truncated there, since
/// the wire format uses a null terminator instead of a length prefix.
fn encodable_str_len(bytes: &[u8]) -> usize {
    bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len())
}

impl Loggable for str {
    const TAG: u8 = 15;

    #[inline]
    fn encoded_len(&self) -> usize {
        encodable_str_len(self.as_bytes()) + 1
    }

    fn encode(&self, writer: &mut PayloadWriter<'_>) {
        let bytes = self.as_bytes();
        writer.put(&bytes[..encodable_str_len(bytes)]);
        writer.put_byte(0);
    }

    fn decode(reader: &mut PayloadReader<'_>, out: &mut String) {
        out.push_str(&String::from_utf8_lossy(reader.take_until_nul()));
    }
}

// String and str share a tag: they encode identically, so call sites using
// either form the same argument type tuple.
impl Loggable for String {
    const TAG: u8 = <str as Loggable>::TAG;

    #[inline]
    fn encoded_len(&self) -> usize {
        self.as_str().encoded_len()
    }

    #[inline]
    fn encode(&self, writer: &mut PayloadWriter<'_>) {
        self.as_str().encode(writer);
    }

    fn decode(reader: &mut PayloadReader<'_>, out: &mut String) {
        <str as Loggable>::decode(reader, out);
    }
}

impl<T: Loggable + ?Sized> Loggable for &T {
    const TAG: u8 = T::TAG;

    #[inline]
    fn encoded_len(&self) -> usize {
        (**self).encoded_len()
    }

    #[inline]
    fn encode(&self, writer: &mut PayloadWriter<'_>) {
        (**self).encode(writer);
    }

    fn decode(reader: &mut PayloadReader<'_>, out: &mut String) {
        T::decode(reader, out);
    }
}

/// An argument tuple behind one logging call.
///
/// `splice` walks the template left to right: the literal segment before
/// each `{}` is written out, then one argument is decoded into its place.
/// Whatever follows the last placeholder is written verbatim.
pub trait LogArguments {
    /// Type-tag sequence; part of the formatter identity key.
    const TAGS: &'static [u8];

    fn encoded_len(&self) -> usize;
    fn encode(&self, writer: &mut PayloadWriter<'_>);
    fn splice(reader: &mut PayloadReader<'_>, template: &str, out: &mut String);
}

impl LogArguments for () {
    const TAGS: &'static [u8] = &[];

    fn encoded_len(&self) -> usize {
        0
    }

    fn encode(&self, _writer: &mut PayloadWriter<'_>) {}

    fn splice(_reader: &mut PayloadReader<'_>, template: &str, out: &mut String) {
        out.push_str(template);
    }
}

macro_rules! tuple_log_arguments {
    ($($name:ident),+) => {
        #[allow(non_snake_case)]
        impl<$($name: Loggable),+> LogArguments for ($($name,)+) {
            const TAGS: &'static [u8] = &[$($name::TAG),+];

            fn encoded_len(&self) -> usize {
                let ($($name,)+) = self;
                0 $(+ $name.encoded_len())+
            }

            fn encode(&self, writer: &mut PayloadWriter<'_>) {
                let ($($name,)+) = self;
                $($name.encode(writer);)+
            }

            fn splice(reader: &mut PayloadReader<'_>, template: &str, out: &mut String) {
                let mut rest = template;
                $(
                    match rest.find("{}") {
                        Some(pos) => {
                            out.push_str(&rest[..pos]);
                            $name::decode(reader, out);
                            rest = &rest[pos + 2..];
                        }
                        None => {
                            out.push_str(rest);
                            return;
                        }
                    }
                )+
                out.push_str(rest);
            }
        }
    };
}

tuple_log_arguments!(A);
tuple_log_arguments!(A, B);
tuple_log_arguments!(A, B, C);
tuple_log_arguments!(A, B, C, D);
tuple_log_arguments!(A, B, C, D, E);
tuple_log_arguments!(A, B, C, D, E, F);
tuple_log_arguments!(A, B, C, D, E, F, G);
tuple_log_arguments!(A, B, C, D, E, F, G, H);
