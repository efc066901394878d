use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::GraphState;
use crate::error::{GraphBenchError, Result};

pub(crate) const SNAPSHOT_FILE: &str = "graph.snapshot";
const MAGIC: &[u8; 4] = b"GBS1";
const HEADER_LEN: usize = 4 + 4 + 8;

pub(crate) fn snapshot_path(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_FILE)
}

/// Reads the snapshot in `dir`, if one was written.
///
/// Layout: magic, CRC32 of the body (LE), body length (LE), JSON body.
pub(crate) fn load(dir: &Path) -> Result<Option<GraphState>> {
    let path = snapshot_path(dir);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path)?;
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err(GraphBenchError::Corruption(format!(
            "{} is not a graph snapshot",
            path.display()
        )));
    }
    let crc = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[8..HEADER_LEN]);
    let len = u64::from_le_bytes(len_bytes) as usize;
    let body = &bytes[HEADER_LEN..];
    if body.len() != len {
        return Err(GraphBenchError::Corruption(format!(
            "snapshot body is {} bytes, header says {len}",
            body.len()
        )));
    }
    if crc32fast::hash(body) != crc {
        return Err(GraphBenchError::Corruption(
            "snapshot checksum mismatch".into(),
        ));
    }
    let state: GraphState = serde_json::from_slice(body)?;
    debug!(
        path = %path.display(),
        nodes = state.nodes.len(),
        "Snapshot loaded"
    );
    Ok(Some(state))
}

/// Writes `state` next to a temporary file and renames it into place.
pub(crate) fn persist(dir: &Path, state: &GraphState) -> Result<()> {
    let body = serde_json::to_vec(state)?;
    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    buf.extend_from_slice(&(body.len() as u64).to_le_bytes());
    buf.extend_from_slice(&body);

    let target = snapshot_path(dir);
    let tmp = target.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&buf)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, &target)?;
    debug!(
        path = %target.display(),
        bytes = buf.len(),
        "Snapshot written"
    );
    Ok(())
}
