//! Generic transfers that only rely on the file contract
//!
//! Used when two adapters cannot talk to each other natively, e.g. a move
//! across protocols.

use tracing::debug;

use crate::backend::FileAdapter;
use crate::error::{Result, VfsError};

/// Copy the contents of `src` into `dest`, creating or truncating it
pub async fn copy_contents<S>(src: &S, dest: &dyn FileAdapter) -> Result<u64>
where
    S: FileAdapter + ?Sized,
{
    if src.is_directory().await? {
        return Err(VfsError::io(format!(
            "cannot copy directory {} by contents",
            src.absolute_path()
        )));
    }

    let mut reader = src.input_stream().await?;
    let mut writer = dest.output_stream(false).await?;

    loop {
        let chunk = reader.read_chunk().await?;
        if !chunk.data.is_empty() {
            writer.write_chunk(&chunk.data).await?;
        }
        if chunk.is_last {
            break;
        }
    }

    writer.close().await?;
    reader.close().await?;
    Ok(writer.bytes_written())
}

/// Move by copying then deleting the source
///
/// Any failure is raised; the destination may be left partially written.
pub async fn move_by_copy<S>(src: &S, dest: &dyn FileAdapter) -> Result<bool>
where
    S: FileAdapter + ?Sized,
{
    debug!(
        from = %src.absolute_path(),
        to = %dest.absolute_path(),
        "moving by copy"
    );
    copy_contents(src, dest).await?;
    src.delete().await?;
    Ok(true)
}
