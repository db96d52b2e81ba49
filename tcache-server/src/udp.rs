//! # UDP Datagram Framing
//!
//! spec.md §6: every datagram carries an 8-byte header (request id,
//! sequence number, total datagram count, reserved) ahead of the text
//! protocol payload. A request must fit in a single datagram; a response
//! larger than [`UDP_MAX_PAYLOAD_SIZE`] is fragmented across several,
//! never splitting a `VALUE` header line.

pub const UDP_HEADER_LEN: usize = 8;
pub const UDP_MAX_PAYLOAD_SIZE: usize = 1400;
const MAX_DATAGRAM_PAYLOAD: usize = UDP_MAX_PAYLOAD_SIZE - UDP_HEADER_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramHeader {
    pub request_id: u16,
    pub seq: u16,
    pub total: u16,
    pub reserved: u16,
}

impl DatagramHeader {
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < UDP_HEADER_LEN {
            return None;
        }
        Some(DatagramHeader {
            request_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            seq: u16::from_be_bytes([bytes[2], bytes[3]]),
            total: u16::from_be_bytes([bytes[4], bytes[5]]),
            reserved: u16::from_be_bytes([bytes[6], bytes[7]]),
        })
    }

    pub fn encode(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.request_id.to_be_bytes());
        out.extend_from_slice(&self.seq.to_be_bytes());
        out.extend_from_slice(&self.total.to_be_bytes());
        out.extend_from_slice(&self.reserved.to_be_bytes());
    }
}

/// Splits `payload` into chunks of at most [`MAX_DATAGRAM_PAYLOAD`] bytes,
/// never letting a boundary fall strictly inside one of the `unsplittable`
/// byte ranges (the `VALUE key flags nbytes\r\n` header lines of a `get`
/// reply). A single unsplittable span longer than the datagram budget is
/// unavoidable and is emitted whole, overflowing that one datagram.
fn fragment_payload<'a>(payload: &'a [u8], unsplittable: &[(usize, usize)]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::new();
    let mut pos = 0;
    while pos < payload.len() {
        let mut end = (pos + MAX_DATAGRAM_PAYLOAD).min(payload.len());
        for &(start, len) in unsplittable {
            let span_end = start + len;
            if start < end && end < span_end {
                end = start;
                break;
            }
        }
        if end <= pos {
            end = (pos + MAX_DATAGRAM_PAYLOAD).min(payload.len());
        }
        chunks.push(&payload[pos..end]);
        pos = end;
    }
    if chunks.is_empty() {
        chunks.push(&payload[0..0]);
    }
    chunks
}

/// A response payload paired with the byte ranges the fragmenter must
/// keep whole, as produced by [`crate::dispatch::GetResponse::flatten`]
/// or built directly from a single-buffer reply.
pub struct FramedResponse {
    pub payload: Vec<u8>,
    pub unsplittable: Vec<(usize, usize)>,
}

impl FramedResponse {
    pub fn flat(payload: Vec<u8>) -> Self {
        FramedResponse { payload, unsplittable: Vec::new() }
    }
}

/// [`build_response_datagrams`] over a [`FramedResponse`].
pub fn build_response_datagrams_for(request_id: u16, response: &FramedResponse) -> Vec<Vec<u8>> {
    build_response_datagrams(request_id, &response.payload, &response.unsplittable)
}

/// Builds the full set of outgoing datagrams (header + payload slice,
/// ready to send) for one response.
pub fn build_response_datagrams(request_id: u16, payload: &[u8], unsplittable: &[(usize, usize)]) -> Vec<Vec<u8>> {
    let chunks = fragment_payload(payload, unsplittable);
    let total = chunks.len() as u16;
    chunks
        .into_iter()
        .enumerate()
        .map(|(seq, chunk)| {
            let mut datagram = Vec::with_capacity(UDP_HEADER_LEN + chunk.len());
            DatagramHeader { request_id, seq: seq as u16, total, reserved: 0 }.encode(&mut datagram);
            datagram.extend_from_slice(chunk);
            datagram
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrips() {
        let header = DatagramHeader { request_id: 7, seq: 1, total: 3, reserved: 0 };
        let mut bytes = Vec::new();
        header.encode(&mut bytes);
        assert_eq!(DatagramHeader::decode(&bytes), Some(header));
    }

    #[test]
    fn small_response_is_one_datagram() {
        let payload = b"END\r\n";
        let datagrams = build_response_datagrams(1, payload, &[]);
        assert_eq!(datagrams.len(), 1);
        assert_eq!(&datagrams[0][UDP_HEADER_LEN..], payload);
    }

    #[test]
    fn large_response_fragments_without_splitting_headers() {
        let value = vec![b'x'; 3000];
        let header = b"VALUE k 0 3000\r\n".to_vec();
        let mut payload = header.clone();
        payload.extend_from_slice(&value);
        payload.extend_from_slice(b"\r\n");
        payload.extend_from_slice(b"END\r\n");

        let unsplittable = vec![(0usize, header.len())];
        let datagrams = build_response_datagrams(9, &payload, &unsplittable);
        assert!(datagrams.len() > 1);

        // The header must survive whole inside the first datagram's payload.
        let first_payload = &datagrams[0][UDP_HEADER_LEN..];
        assert!(first_payload.len() >= header.len());
        assert_eq!(&first_payload[..header.len()], header.as_slice());

        // Concatenating payloads in sequence-number order reconstructs the
        // original response byte-for-byte (the universal invariant from
        // spec.md §8).
        let mut reassembled = Vec::new();
        for datagram in &datagrams {
            let h = DatagramHeader::decode(datagram).unwrap();
            assert_eq!(h.request_id, 9);
            reassembled.extend_from_slice(&datagram[UDP_HEADER_LEN..]);
        }
        assert_eq!(reassembled, payload);
    }
}
