use crate::error::{DrawError, DrawResult};
use wplacer_common::Pixel;

pub const DEFAULT_BATCH_SIZE: usize = 16;

/// One submission worth of pixels.
///
/// `coords` is the flattened `[x0, y0, x1, y1, ..]` list the endpoint expects,
/// so it is always twice as long as `colors`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub coords: Vec<u32>,
    pub colors: Vec<u8>,
}

impl Batch {
    /// Charges needed to send this batch, one per pixel.
    pub fn cost(&self) -> usize {
        self.colors.len()
    }
}

/// Split the pixel list into consecutive batches of `batch_size`.
///
/// Batch `i` always holds pixels `[i * batch_size, (i + 1) * batch_size)`, the
/// last one may be shorter. An empty list yields no batches.
pub fn plan_batches(pixels: &[Pixel], batch_size: usize) -> DrawResult<Vec<Batch>> {
    if batch_size == 0 {
        return Err(DrawError::InvalidBatchSize(batch_size));
    }

    let batches = pixels
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            coords: chunk.iter().flat_map(|pixel| [pixel.x, pixel.y]).collect(),
            colors: chunk.iter().map(|pixel| pixel.color_id).collect(),
        })
        .collect();

    Ok(batches)
}
