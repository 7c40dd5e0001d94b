use serde::{Deserialize, Serialize};

/// One contiguous byte range of a file, transported and acknowledged
/// independently.
///
/// `start..end` is half-open; `size == end - start`. Only `uploaded` and
/// `checksum` mutate after planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDescriptor {
    pub index: u32,
    pub start: u64,
    pub end: u64,
    pub size: u64,
    pub uploaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Splits a file of `file_size` bytes into fixed-size chunk descriptors.
///
/// Deterministic: the same inputs always yield byte-identical plans, so a
/// resumed session re-plans to exactly the descriptors it persisted.
/// A zero-length file yields an empty plan — callers treat it as trivially
/// complete and never invoke transport for it.
///
/// # Panics
///
/// Panics if `chunk_size == 0`. That is a programmer error, not a runtime
/// condition.
pub fn plan_chunks(file_size: u64, chunk_size: u64) -> Vec<ChunkDescriptor> {
    assert!(chunk_size > 0, "chunk_size must be non-zero");

    let count = file_size.div_ceil(chunk_size);
    let mut chunks = Vec::with_capacity(count as usize);
    for index in 0..count {
        let start = index * chunk_size;
        let end = std::cmp::min(start + chunk_size, file_size);
        chunks.push(ChunkDescriptor {
            index: index as u32,
            start,
            end,
            size: end - start,
            uploaded: false,
            checksum: None,
        });
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_covers_file_exactly() {
        let chunks = plan_chunks(10, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks.iter().map(|c| c.size).sum::<u64>(), 10);
        assert_eq!(chunks[2].size, 2); // Tail chunk is short.
    }

    #[test]
    fn plan_chunks_are_contiguous() {
        let chunks = plan_chunks(1000, 64);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert_eq!(pair[1].index, pair[0].index + 1);
        }
        assert_eq!(chunks.last().unwrap().end, 1000);
    }

    #[test]
    fn plan_exact_multiple() {
        let chunks = plan_chunks(12, 4);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.size == 4));
    }

    #[test]
    fn plan_single_chunk_when_file_smaller() {
        let chunks = plan_chunks(3, 1024);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].size, 3);
    }

    #[test]
    fn plan_zero_length_file_is_empty() {
        assert!(plan_chunks(0, 1024).is_empty());
    }

    #[test]
    fn plan_is_deterministic() {
        assert_eq!(plan_chunks(123_456, 1000), plan_chunks(123_456, 1000));
    }

    #[test]
    #[should_panic(expected = "chunk_size must be non-zero")]
    fn plan_zero_chunk_size_panics() {
        plan_chunks(10, 0);
    }

    #[test]
    fn plan_scenario_twelve_mib() {
        let mib = 1024 * 1024;
        let chunks = plan_chunks(12 * mib, mib);
        assert_eq!(chunks.len(), 12);
        assert!(chunks.iter().all(|c| c.size == mib));
        assert!(chunks.iter().all(|c| !c.uploaded));
    }

    #[test]
    fn descriptor_json_uses_camel_case() {
        let chunks = plan_chunks(4, 4);
        let json = serde_json::to_string(&chunks[0]).unwrap();
        assert!(json.contains("\"uploaded\":false"));
        // Unset checksum is omitted.
        assert!(!json.contains("checksum"));
    }
}
