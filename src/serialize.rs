use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::config::{Concurrency, Config, HashAlgorithm};
use crate::dense::DenseSketch;
use crate::hllpp::Hllpp;
use crate::sparse::SparseSketch;
use crate::Error;

const VARIANT_SPARSE: u8 = 0;
const VARIANT_DENSE: u8 = 1;

fn hash_algorithm_tag(algorithm: HashAlgorithm) -> u8 {
    match algorithm {
        HashAlgorithm::Fast => 0,
        HashAlgorithm::Cryptographic => 1,
    }
}

fn hash_algorithm_from_tag(tag: u8) -> Result<HashAlgorithm, Error> {
    match tag {
        0 => Ok(HashAlgorithm::Fast),
        1 => Ok(HashAlgorithm::Cryptographic),
        other => Err(Error::SerializationError(format!(
            "unknown hash algorithm tag {other}"
        ))),
    }
}

/// Wire form of a sketch: a small fixed header (`p`, `p'`, hash algorithm, variant) followed
/// by the variant payload — the sparse sorted run-list as little-endian `u32`s, or the dense
/// packed-register byte array verbatim. Independent of the external gRPC `Sketch` message; a
/// boundary service maps this byte form onto that wire type.
pub fn to_bytes(h: &Hllpp) -> Vec<u8> {
    let config = h.config();
    let mut buf = Vec::new();
    buf.push(config.precision);
    buf.push(config.sparse_precision);
    buf.push(hash_algorithm_tag(config.hash_algorithm));

    if h.is_dense() {
        buf.push(VARIANT_DENSE);
        h.with_dense(|dense| write_dense_payload(&mut buf, dense));
    } else {
        buf.push(VARIANT_SPARSE);
        h.with_sparse(|sparse| write_sparse_payload(&mut buf, sparse));
    }

    buf
}

fn write_dense_payload(buf: &mut Vec<u8>, dense: &DenseSketch) {
    buf.write_u32::<LittleEndian>(dense.m() as u32).unwrap();
    for i in 0..dense.m() {
        buf.push(dense.get(i));
    }
}

fn write_sparse_payload(buf: &mut Vec<u8>, sparse: &SparseSketch) {
    let entries = sparse.raw_entries();
    buf.write_u32::<LittleEndian>(entries.len() as u32).unwrap();
    for entry in entries {
        buf.write_u32::<LittleEndian>(entry).unwrap();
    }
}

/// Reconstructs a sketch from its wire form. The resulting sketch always uses concurrent
/// locking; callers that need a single-threaded sketch should `import` then move it, since
/// concurrency mode is not itself part of the wire format.
pub fn from_bytes(buf: &[u8]) -> Result<Hllpp, Error> {
    let mut cursor = buf;
    if cursor.len() < 4 {
        return Err(Error::SerializationError("truncated header".into()));
    }

    let precision = cursor[0];
    let sparse_precision = cursor[1];
    let hash_algorithm = hash_algorithm_from_tag(cursor[2])?;
    let variant = cursor[3];
    cursor = &cursor[4..];

    let config = Config::with_concurrency(
        precision,
        hash_algorithm,
        true,
        Concurrency::Concurrent,
    )
    .map_err(|e| Error::SerializationError(e.to_string()))?;

    if config.sparse_precision != sparse_precision {
        return Err(Error::SerializationError(format!(
            "sparse precision mismatch: expected {}, got {sparse_precision}",
            config.sparse_precision
        )));
    }

    match variant {
        VARIANT_DENSE => read_dense_payload(config, cursor),
        VARIANT_SPARSE => read_sparse_payload(config, cursor),
        other => Err(Error::SerializationError(format!(
            "unknown sketch variant tag {other}"
        ))),
    }
}

fn read_dense_payload(config: Config, mut cursor: &[u8]) -> Result<Hllpp, Error> {
    let m = cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| Error::SerializationError(e.to_string()))?;
    if m as usize != config.m() {
        return Err(Error::SerializationError(format!(
            "register count mismatch: expected {}, got {m}",
            config.m()
        )));
    }
    if cursor.len() != m as usize {
        return Err(Error::SerializationError(
            "dense payload length does not match register count".into(),
        ));
    }

    let dense = DenseSketch::new(config);
    for (i, &value) in cursor.iter().enumerate() {
        if value > 0 {
            dense.set_max(i, value);
        }
    }
    Ok(Hllpp::from_dense(config, dense))
}

fn read_sparse_payload(config: Config, mut cursor: &[u8]) -> Result<Hllpp, Error> {
    let count = cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| Error::SerializationError(e.to_string()))?;

    let sparse = SparseSketch::new(config);
    for _ in 0..count {
        let raw = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::SerializationError(e.to_string()))?;
        sparse.insert_raw_entry(raw);
    }
    Ok(Hllpp::from_sparse(config, sparse))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashAlgorithm;

    #[test]
    fn dense_round_trip_is_byte_identical() {
        let config = Config::new(12, HashAlgorithm::Fast).unwrap();
        let h = Hllpp::new(config);
        for i in 0..5_000u32 {
            h.insert_key(&i.to_le_bytes());
        }
        assert!(h.is_dense());

        let bytes = to_bytes(&h);
        let restored = from_bytes(&bytes).unwrap();
        assert!(restored.is_dense());
        assert_eq!(h.element_count(), restored.element_count());
        assert_eq!(bytes, to_bytes(&restored));
    }

    #[test]
    fn sparse_round_trip_preserves_count() {
        let config = Config::new(14, HashAlgorithm::Fast).unwrap();
        let h = Hllpp::new(config);
        for i in 0..10u32 {
            h.insert_key(&i.to_le_bytes());
        }
        assert!(!h.is_dense());

        let bytes = to_bytes(&h);
        let restored = from_bytes(&bytes).unwrap();
        assert!(!restored.is_dense());
        assert_eq!(h.element_count(), restored.element_count());
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(from_bytes(&[1, 2]).is_err());
    }
}
