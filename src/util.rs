use std::ops::RangeFrom;

use nom::error::{make_error, ErrorKind, ParseError};
use nom::{Err, IResult, InputIter, InputLength, Slice};

pub fn be_u48<I, E: ParseError<I>>(input: I) -> IResult<I, u64, E>
where
    I: Slice<RangeFrom<usize>> + InputIter<Item = u8> + InputLength,
{
    let bound: usize = 6;

    if input.input_len() < bound {
        Err(Err::Error(make_error(input, ErrorKind::Eof)))
    } else {
        let mut res = 0u64;

        for byte in input.iter_elements().take(bound) {
            res = (res << 8) + byte as u64;
        }

        Ok((input.slice(bound..), res))
    }
}

/// Append the low 24 bits of `value` in big-endian order.
pub fn put_u24(output: &mut Vec<u8>, value: u32) {
    output.extend_from_slice(&value.to_be_bytes()[1..]);
}

/// Append the low 48 bits of `value` in big-endian order.
pub fn put_u48(output: &mut Vec<u8>, value: u64) {
    output.extend_from_slice(&value.to_be_bytes()[2..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn be_u48_reads_six_bytes() {
        let input = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0xFF];
        let (rest, value) = be_u48::<_, nom::error::Error<&[u8]>>(&input[..]).unwrap();
        assert_eq!(value, 0x0102_0304_0506);
        assert_eq!(rest, &[0xFF]);
    }

    #[test]
    fn be_u48_too_short() {
        let input = [0x01, 0x02];
        assert!(be_u48::<_, nom::error::Error<&[u8]>>(&input[..]).is_err());
    }

    #[test]
    fn put_u24_truncates_high_byte() {
        let mut out = Vec::new();
        put_u24(&mut out, 0x00AB_CDEF);
        assert_eq!(out, [0xAB, 0xCD, 0xEF]);
    }
}
