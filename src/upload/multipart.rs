//! Manual multipart/form-data encoder.
//!
//! One upload carries exactly one form part named `file` with an
//! `image/jpeg` content type:
//!
//! ```text
//! --{boundary}\r\n
//! Content-Disposition: form-data; name="file"; filename="{filename}"\r\n
//! Content-Type: image/jpeg\r\n
//! \r\n
//! {image-bytes}\r\n
//! --{boundary}--\r\n
//! ```
//!
//! The final length is computed from the segment lengths before any
//! allocation, the buffer is reserved once at exactly that size, and the
//! segments are appended in order. Allocation refusal surfaces as
//! `EncodeError::Allocation` so the caller can fail the cycle and still
//! release the source frame.

use std::error::Error;
use std::fmt;

const PART_OPEN: &str = "--";
const DISPOSITION_HEADER: &str = "\r\nContent-Disposition: form-data; name=\"file\"; filename=\"";
const PART_HEADER_END: &str = "\"\r\nContent-Type: image/jpeg\r\n\r\n";
const TRAILER_OPEN: &str = "\r\n--";
const TRAILER_END: &str = "--\r\n";

/// Fully encoded multipart body plus its exact length, ready to send with an
/// exact `Content-Length`. Owned by one cycle and dropped when it ends.
pub struct EncodedPayload {
    bytes: Vec<u8>,
}

impl EncodedPayload {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Exact body length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for EncodedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedPayload")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Encoding failure. Memory pressure is recoverable per cycle, never fatal
/// to the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodeError {
    /// The runtime refused the single body allocation.
    Allocation { requested: usize },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::Allocation { requested } => {
                write!(f, "multipart body allocation of {requested} bytes refused")
            }
        }
    }
}

impl Error for EncodeError {}

/// Exact encoded body length for the given inputs, computed without
/// allocating.
pub fn encoded_len(boundary: &str, filename: &str, image_len: usize) -> usize {
    PART_OPEN.len()
        + boundary.len()
        + DISPOSITION_HEADER.len()
        + filename.len()
        + PART_HEADER_END.len()
        + image_len
        + TRAILER_OPEN.len()
        + boundary.len()
        + TRAILER_END.len()
}

/// Encode one image into a single contiguous multipart body.
///
/// Deterministic: identical inputs yield identical bytes, so the boundary
/// and filename are taken as inputs rather than generated here. Boundary and
/// filename must not contain CR/LF; they are synthesized upstream from a
/// fixed prefix and numeric values, so no escaping is performed.
pub fn encode_form_data(
    boundary: &str,
    filename: &str,
    image: &[u8],
) -> Result<EncodedPayload, EncodeError> {
    debug_assert!(
        !boundary.contains('\r') && !boundary.contains('\n'),
        "boundary must not contain CR/LF"
    );
    debug_assert!(
        !filename.contains('\r') && !filename.contains('\n'),
        "filename must not contain CR/LF"
    );

    let total = encoded_len(boundary, filename, image.len());

    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(total)
        .map_err(|_| EncodeError::Allocation { requested: total })?;

    bytes.extend_from_slice(PART_OPEN.as_bytes());
    bytes.extend_from_slice(boundary.as_bytes());
    bytes.extend_from_slice(DISPOSITION_HEADER.as_bytes());
    bytes.extend_from_slice(filename.as_bytes());
    bytes.extend_from_slice(PART_HEADER_END.as_bytes());
    bytes.extend_from_slice(image);
    bytes.extend_from_slice(TRAILER_OPEN.as_bytes());
    bytes.extend_from_slice(boundary.as_bytes());
    bytes.extend_from_slice(TRAILER_END.as_bytes());

    debug_assert_eq!(bytes.len(), total);
    Ok(EncodedPayload { bytes })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_STUB: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xD9];

    #[test]
    fn round_trip_matches_wire_format() {
        let payload = encode_form_data("B1", "image_1000.jpg", &JPEG_STUB).unwrap();

        let preamble = concat!(
            "--B1\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"image_1000.jpg\"\r\n",
            "Content-Type: image/jpeg\r\n",
            "\r\n"
        );
        let trailer = "\r\n--B1--\r\n";

        assert!(payload.bytes().starts_with(preamble.as_bytes()));
        assert_eq!(
            &payload.bytes()[preamble.len()..preamble.len() + JPEG_STUB.len()],
            &JPEG_STUB
        );
        assert!(payload.bytes().ends_with(trailer.as_bytes()));
        assert_eq!(payload.len(), preamble.len() + JPEG_STUB.len() + trailer.len());
    }

    #[test]
    fn length_equals_segment_sum() {
        let image = vec![0xABu8; 4096];
        let boundary = "----FacilityCamFormBoundary1234567";
        let filename = "image_98304.jpg";
        let payload = encode_form_data(boundary, filename, &image).unwrap();

        assert_eq!(payload.len(), encoded_len(boundary, filename, image.len()));
        assert_eq!(payload.len(), payload.bytes().len());
    }

    #[test]
    fn starts_and_ends_with_boundary_markers() {
        let payload = encode_form_data("Bxyz", "a.jpg", &JPEG_STUB).unwrap();
        assert!(payload.bytes().starts_with(b"--Bxyz\r\n"));
        assert!(payload.bytes().ends_with(b"--Bxyz--\r\n"));
    }

    #[test]
    fn identical_inputs_produce_identical_bytes() {
        let first = encode_form_data("B1", "image_1000.jpg", &JPEG_STUB).unwrap();
        let second = encode_form_data("B1", "image_1000.jpg", &JPEG_STUB).unwrap();
        assert_eq!(first.bytes(), second.bytes());
    }

    #[test]
    fn empty_image_still_frames_correctly() {
        let payload = encode_form_data("B1", "image_0.jpg", &[]).unwrap();
        assert_eq!(payload.len(), encoded_len("B1", "image_0.jpg", 0));
        assert!(payload.bytes().starts_with(b"--B1\r\n"));
        assert!(payload.bytes().ends_with(b"\r\n--B1--\r\n"));
    }

    #[test]
    fn allocation_error_reports_requested_size() {
        let err = EncodeError::Allocation { requested: 1024 };
        assert_eq!(
            err.to_string(),
            "multipart body allocation of 1024 bytes refused"
        );
    }
}
