//! H.264 Annex-B inspection
//!
//! Device encoders hand out H.264 as an Annex-B byte stream: NAL units
//! separated by `00 00 01` or `00 00 00 01` start codes.
//!
//! ```text
//! +-------------+------------+---------+-------------+------------+-----
//! | start code  | NAL header | payload | start code  | NAL header | ...
//! | 00 00 00 01 | F|NRI|Type |         | 00 00 01    | F|NRI|Type |
//! +-------------+------------+---------+-------------+------------+-----
//! ```
//!
//! Only the NAL framing is inspected here; no slice or SPS parsing.

/// NAL unit type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    /// Non-IDR slice
    Slice = 1,
    /// Slice data partition A
    SlicePartA = 2,
    /// Slice data partition B
    SlicePartB = 3,
    /// Slice data partition C
    SlicePartC = 4,
    /// IDR slice (keyframe)
    Idr = 5,
    /// Supplemental enhancement information
    Sei = 6,
    /// Sequence parameter set
    Sps = 7,
    /// Picture parameter set
    Pps = 8,
    /// Access unit delimiter
    Aud = 9,
    /// End of sequence
    EndSeq = 10,
    /// End of stream
    EndStream = 11,
    /// Filler data
    Filler = 12,
}

impl NaluType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            1 => Some(NaluType::Slice),
            2 => Some(NaluType::SlicePartA),
            3 => Some(NaluType::SlicePartB),
            4 => Some(NaluType::SlicePartC),
            5 => Some(NaluType::Idr),
            6 => Some(NaluType::Sei),
            7 => Some(NaluType::Sps),
            8 => Some(NaluType::Pps),
            9 => Some(NaluType::Aud),
            10 => Some(NaluType::EndSeq),
            11 => Some(NaluType::EndStream),
            12 => Some(NaluType::Filler),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(self, NaluType::Idr)
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NaluType::Sps | NaluType::Pps)
    }
}

/// Iterator over NAL units in an Annex-B byte stream
///
/// Yields each NAL unit without its start code. Bytes before the first
/// start code are skipped.
pub struct AnnexBIterator<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> AnnexBIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let offset = find_start_code(data, 0).map_or(data.len(), |(_, end)| end);
        Self { data, offset }
    }
}

impl<'a> Iterator for AnnexBIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }

        let start = self.offset;
        match find_start_code(self.data, start) {
            Some((code_start, code_end)) => {
                self.offset = code_end;
                Some(&self.data[start..code_start])
            }
            None => {
                self.offset = self.data.len();
                Some(&self.data[start..])
            }
        }
    }
}

/// Find the next start code at or after `from`
///
/// Returns `(start, end)` of the start code itself. A four byte start code
/// is reported from its leading zero.
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            let start = if i > from && data[i - 1] == 0 { i - 1 } else { i };
            return Some((start, i + 3));
        }
        i += 1;
    }
    None
}

/// Check whether a frame payload looks like Annex-B H.264
///
/// The payload must open with a start code and the first NAL header must
/// have the forbidden bit clear and a known NAL type.
pub fn is_h264_frame(data: &[u8]) -> bool {
    let header = if data.starts_with(&[0, 0, 0, 1]) {
        data.get(4)
    } else if data.starts_with(&[0, 0, 1]) {
        data.get(3)
    } else {
        None
    };

    match header {
        Some(&b) => b & 0x80 == 0 && NaluType::from_byte(b).is_some(),
        None => false,
    }
}

/// Check whether a decoder can start from this frame
///
/// True when the frame carries an SPS or an IDR slice.
pub fn is_random_access_point(data: &[u8]) -> bool {
    AnnexBIterator::new(data)
        .filter_map(|nalu| nalu.first().copied().and_then(NaluType::from_byte))
        .any(|t| t == NaluType::Sps || t.is_keyframe())
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDR_FRAME: &[u8] = &[
        0x00, 0x00, 0x00, 0x01, 0x67, 0x64, 0x00, 0x1F, // SPS
        0x00, 0x00, 0x00, 0x01, 0x68, 0xEE, 0x3C, 0x80, // PPS
        0x00, 0x00, 0x01, 0x65, 0x88, 0x84, // IDR
    ];

    const P_FRAME: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x41, 0x9A, 0x02];

    #[test]
    fn test_nalu_type() {
        assert_eq!(NaluType::from_byte(0x65), Some(NaluType::Idr));
        assert_eq!(NaluType::from_byte(0x67), Some(NaluType::Sps));
        assert_eq!(NaluType::from_byte(0x68), Some(NaluType::Pps));
        assert_eq!(NaluType::from_byte(0x41), Some(NaluType::Slice));
        assert_eq!(NaluType::from_byte(0x00), None);
    }

    #[test]
    fn test_annexb_iterator() {
        let nalus: Vec<&[u8]> = AnnexBIterator::new(IDR_FRAME).collect();
        assert_eq!(nalus.len(), 3);
        assert_eq!(nalus[0], &[0x67, 0x64, 0x00, 0x1F]);
        assert_eq!(nalus[1], &[0x68, 0xEE, 0x3C, 0x80]);
        assert_eq!(nalus[2], &[0x65, 0x88, 0x84]);
    }

    #[test]
    fn test_annexb_iterator_no_start_code() {
        assert_eq!(AnnexBIterator::new(&[0xFF, 0xD8, 0xFF]).count(), 0);
    }

    #[test]
    fn test_is_h264_frame() {
        assert!(is_h264_frame(IDR_FRAME));
        assert!(is_h264_frame(P_FRAME));
        assert!(is_h264_frame(&[0x00, 0x00, 0x01, 0x09, 0xF0]));

        // JPEG SOI marker
        assert!(!is_h264_frame(&[0xFF, 0xD8, 0xFF, 0xE0]));
        // Forbidden bit set
        assert!(!is_h264_frame(&[0x00, 0x00, 0x00, 0x01, 0xE5]));
        // Truncated
        assert!(!is_h264_frame(&[0x00, 0x00, 0x00, 0x01]));
        assert!(!is_h264_frame(&[]));
    }

    #[test]
    fn test_is_random_access_point() {
        assert!(is_random_access_point(IDR_FRAME));
        assert!(!is_random_access_point(P_FRAME));
    }
}
