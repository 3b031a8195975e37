use core::fmt;

/// Space separated hex dump of a byte slice, used when tracing link traffic.
pub struct HexSlice<'a>(&'a [u8]);

impl<'a> HexSlice<'a> {
    fn new<T>(data: &'a T) -> HexSlice<'a>
    where
        T: ?Sized + AsRef<[u8]> + 'a,
    {
        HexSlice(data.as_ref())
    }
}

impl fmt::Display for HexSlice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = self.0.iter();
        if let Some(first) = bytes.next() {
            write!(f, "{:02X}", first)?;
        }
        for byte in bytes {
            write!(f, " {:02X}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for HexSlice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self)
    }
}

pub trait HexDisplayExt {
    fn hex(&self) -> HexSlice<'_>;
}

impl<T> HexDisplayExt for T
where
    T: ?Sized + AsRef<[u8]>,
{
    fn hex(&self) -> HexSlice<'_> {
        HexSlice::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spaced_dump() {
        assert_eq!([0xFFu8, 0x0A, 0x00].hex().to_string(), "FF 0A 00");
        assert_eq!(format!("{:?}", [0xAAu8].hex()), "[AA]");
        assert_eq!(Vec::<u8>::new().hex().to_string(), "");
    }
}
