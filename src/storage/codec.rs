//! Primitive stream encoding.
//!
//! All integers and floats are big-endian. Strings are a `u32` byte length
//! followed by UTF-8 bytes.

use crate::error::{Result, TableError};
use std::io::{Read, Write};

/// Upper bound for a single encoded string, to fail fast on garbage lengths
pub const MAX_STRING_LEN: usize = 1 << 20;

pub fn write_u32(w: &mut dyn Write, value: u32) -> Result<()> {
    w.write_all(&value.to_be_bytes())?;
    Ok(())
}

pub fn read_u32(r: &mut dyn Read) -> Result<u32> {
    let mut bytes = [0u8; 4];
    r.read_exact(&mut bytes)?;
    Ok(u32::from_be_bytes(bytes))
}

pub fn write_i32(w: &mut dyn Write, value: i32) -> Result<()> {
    w.write_all(&value.to_be_bytes())?;
    Ok(())
}

pub fn read_i32(r: &mut dyn Read) -> Result<i32> {
    let mut bytes = [0u8; 4];
    r.read_exact(&mut bytes)?;
    Ok(i32::from_be_bytes(bytes))
}

/// Read a count field, rejecting negative values
pub fn read_count(r: &mut dyn Read, what: &str) -> Result<usize> {
    let count = read_i32(r)?;
    usize::try_from(count)
        .map_err(|_| TableError::corruption(format!("negative {} count: {}", what, count)))
}

/// Write a count field
pub fn write_count(w: &mut dyn Write, count: usize, what: &str) -> Result<()> {
    let count = i32::try_from(count)
        .map_err(|_| TableError::invalid_operation(format!("too many {}: {}", what, count)))?;
    write_i32(w, count)
}

pub fn write_f32(w: &mut dyn Write, value: f32) -> Result<()> {
    w.write_all(&value.to_be_bytes())?;
    Ok(())
}

pub fn read_f32(r: &mut dyn Read) -> Result<f32> {
    let mut bytes = [0u8; 4];
    r.read_exact(&mut bytes)?;
    Ok(f32::from_be_bytes(bytes))
}

pub fn write_string(w: &mut dyn Write, value: &str) -> Result<()> {
    if value.len() > MAX_STRING_LEN {
        return Err(TableError::invalid_operation(format!(
            "string of {} bytes exceeds the {} byte limit",
            value.len(),
            MAX_STRING_LEN
        )));
    }
    write_u32(w, value.len() as u32)?;
    w.write_all(value.as_bytes())?;
    Ok(())
}

pub fn read_string(r: &mut dyn Read) -> Result<String> {
    let len = read_u32(r)? as usize;
    if len > MAX_STRING_LEN {
        return Err(TableError::corruption(format!(
            "string length {} exceeds the {} byte limit",
            len, MAX_STRING_LEN
        )));
    }
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| TableError::corruption("string is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives() -> Result<()> {
        let mut buf = Vec::new();
        write_u32(&mut buf, 4)?;
        write_i32(&mut buf, -2)?;
        write_f32(&mut buf, 0.5)?;
        write_string(&mut buf, "combat.melee")?;
        assert_eq!(&buf[0..4], &[0, 0, 0, 4]);

        let mut reader = buf.as_slice();
        assert_eq!(read_u32(&mut reader)?, 4);
        assert_eq!(read_i32(&mut reader)?, -2);
        assert_eq!(read_f32(&mut reader)?, 0.5);
        assert_eq!(read_string(&mut reader)?, "combat.melee");
        assert!(reader.is_empty());
        Ok(())
    }

    #[test]
    fn test_negative_count_is_corruption() -> Result<()> {
        let mut buf = Vec::new();
        write_i32(&mut buf, -1)?;
        assert!(matches!(
            read_count(&mut buf.as_slice(), "page"),
            Err(TableError::Corruption(_))
        ));
        Ok(())
    }

    #[test]
    fn test_truncated_string() -> Result<()> {
        let mut buf = Vec::new();
        write_string(&mut buf, "terrain")?;
        buf.truncate(6);
        assert!(matches!(
            read_string(&mut buf.as_slice()),
            Err(TableError::Io(_))
        ));

        let garbage = u32::MAX.to_be_bytes();
        assert!(matches!(
            read_string(&mut garbage.as_slice()),
            Err(TableError::Corruption(_))
        ));
        Ok(())
    }
}
