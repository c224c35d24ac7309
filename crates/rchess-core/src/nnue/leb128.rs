//! LEB128 圧縮テンソルの読み書き
//!
//! 評価関数ファイルの重み配列は、マジック文字列と合計バイト数に
//! 続けて符号付き LEB128（7bit グループ + 継続ビット、符号拡張）で
//! 格納される。読み書きともに一括バッファで処理する。

use std::io::{self, Read, Write};

use super::constants::BULK_IO_CHUNK;

/// 圧縮テンソルのマジック文字列
pub const LEB128_MAGIC: &[u8; 17] = b"COMPRESSED_LEB128";

/// LEB128 で読み書きできるスカラー型
pub trait Leb128Scalar: Copy + Default {
    const BITS: u32;

    fn from_i64(v: i64) -> Self;
    fn to_i64(self) -> i64;
}

impl Leb128Scalar for i8 {
    const BITS: u32 = 8;

    #[inline]
    fn from_i64(v: i64) -> i8 {
        v as i8
    }

    #[inline]
    fn to_i64(self) -> i64 {
        self as i64
    }
}

impl Leb128Scalar for i16 {
    const BITS: u32 = 16;

    #[inline]
    fn from_i64(v: i64) -> i16 {
        v as i16
    }

    #[inline]
    fn to_i64(self) -> i64 {
        self as i64
    }
}

impl Leb128Scalar for i32 {
    const BITS: u32 = 32;

    #[inline]
    fn from_i64(v: i64) -> i32 {
        v as i32
    }

    #[inline]
    fn to_i64(self) -> i64 {
        self as i64
    }
}

/// LE の u32 を読む
pub fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// LE の u32 を書く
pub fn write_u32<W: Write>(writer: &mut W, v: u32) -> io::Result<()> {
    writer.write_all(&v.to_le_bytes())
}

/// 圧縮テンソルを読み込んで out を埋める
pub fn read_leb128<T: Leb128Scalar, R: Read>(reader: &mut R, out: &mut [T]) -> io::Result<()> {
    let mut magic = [0u8; 17];
    reader.read_exact(&mut magic)?;
    if &magic != LEB128_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "missing LEB128 magic in compressed tensor",
        ));
    }
    let total_bytes = read_u32(reader)? as usize;

    let mut buf = vec![0u8; total_bytes.min(BULK_IO_CHUNK)];
    let mut buf_len = 0usize;
    let mut buf_pos = 0usize;
    let mut consumed = 0usize;

    for slot in out.iter_mut() {
        let mut result: i64 = 0;
        let mut shift: u32 = 0;
        loop {
            if buf_pos == buf_len {
                let want = (total_bytes - consumed).min(buf.len());
                if want == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "LEB128 tensor truncated",
                    ));
                }
                reader.read_exact(&mut buf[..want])?;
                buf_len = want;
                buf_pos = 0;
                consumed += want;
            }
            let byte = buf[buf_pos];
            buf_pos += 1;
            result |= i64::from(byte & 0x7F) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < T::BITS && byte & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                break;
            }
            if shift >= 64 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "LEB128 value too long",
                ));
            }
        }
        *slot = T::from_i64(result);
    }

    if consumed - (buf_len - buf_pos) != total_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "LEB128 tensor byte count mismatch",
        ));
    }
    Ok(())
}

/// スカラー1つ分の LEB128 バイト列をバッファへ追記する
fn push_leb128(buf: &mut Vec<u8>, mut v: i64) {
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        let done = (v == 0 && byte & 0x40 == 0) || (v == -1 && byte & 0x40 != 0);
        if done {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// テンソルを圧縮して書き出す
pub fn write_leb128<T: Leb128Scalar, W: Write>(writer: &mut W, values: &[T]) -> io::Result<()> {
    let mut payload = Vec::with_capacity(values.len());
    for &v in values {
        push_leb128(&mut payload, v.to_i64());
    }
    let total = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "LEB128 tensor too large"))?;
    writer.write_all(LEB128_MAGIC)?;
    write_u32(writer, total)?;
    writer.write_all(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;
    use std::io::Cursor;

    fn roundtrip<T: Leb128Scalar + PartialEq + std::fmt::Debug>(values: &[T]) {
        let mut buf = Vec::new();
        write_leb128(&mut buf, values).unwrap();
        let mut out = vec![T::default(); values.len()];
        read_leb128(&mut Cursor::new(&buf), &mut out).unwrap();
        assert_eq!(out, values);
    }

    #[test]
    fn test_leb128_unit_values() {
        roundtrip::<i8>(&[0, 1, -1, 63, -64, 64, -65, i8::MAX, i8::MIN]);
        roundtrip::<i16>(&[0, 1, -1, 8191, -8192, 8192, i16::MAX, i16::MIN]);
        roundtrip::<i32>(&[0, 1, -1, 1 << 20, -(1 << 20), i32::MAX, i32::MIN]);
    }

    #[test]
    fn test_leb128_single_byte_encoding() {
        // [-64, 63] は1バイトで収まる
        let mut buf = Vec::new();
        write_leb128::<i8, _>(&mut buf, &[0, 63, -64]).unwrap();
        assert_eq!(&buf[..17], LEB128_MAGIC);
        assert_eq!(u32::from_le_bytes([buf[17], buf[18], buf[19], buf[20]]), 3);
        assert_eq!(buf.len(), 17 + 4 + 3);
    }

    #[test]
    fn test_leb128_random_arrays() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0x5EB1_28AA);
        let v16: Vec<i16> = (0..4096).map(|_| rng.random()).collect();
        roundtrip(&v16);
        let v32: Vec<i32> = (0..1024).map(|_| rng.random()).collect();
        roundtrip(&v32);
        let v8: Vec<i8> = (0..513).map(|_| rng.random()).collect();
        roundtrip(&v8);
    }

    #[test]
    fn test_leb128_bad_magic() {
        let mut buf = Vec::new();
        write_leb128::<i16, _>(&mut buf, &[1, 2, 3]).unwrap();
        buf[0] ^= 0xFF;
        let mut out = [0i16; 3];
        let err = read_leb128(&mut Cursor::new(&buf), &mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_leb128_truncated() {
        let mut buf = Vec::new();
        write_leb128::<i32, _>(&mut buf, &[100000, -100000]).unwrap();
        buf.truncate(buf.len() - 1);
        let mut out = [0i32; 2];
        assert!(read_leb128(&mut Cursor::new(&buf), &mut out).is_err());
    }

    #[test]
    fn test_leb128_count_mismatch() {
        // 要素数より多いバイトが残っているとエラー
        let mut buf = Vec::new();
        write_leb128::<i16, _>(&mut buf, &[1, 2, 3, 4]).unwrap();
        let mut out = [0i16; 3];
        assert!(read_leb128(&mut Cursor::new(&buf), &mut out).is_err());
    }
}
