use rkyv::{Archive, Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Side length of one canvas chunk, in pixels.
pub const CHUNK_SIZE: u32 = 1000;

#[derive(Archive, Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Pixel {
    /// x offset inside the chunk
    pub x: u32,
    /// y offset inside the chunk
    pub y: u32,
    pub color_id: u8,
}

#[derive(Archive, Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ChunkAddr {
    pub x: u32,
    pub y: u32,
}

#[derive(Archive, Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct PixelPlan {
    pub chunk: ChunkAddr,
    // order is significant, batch membership is derived from it
    pub pixels: Vec<Pixel>,
}

impl PixelPlan {
    pub fn new(chunk: ChunkAddr, pixels: Vec<Pixel>) -> Self {
        Self { chunk, pixels }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Identity of the planning inputs.
    ///
    /// Two plans share a fingerprint only if they target the same chunk with the
    /// same pixels in the same order, which is what makes a stored batch index
    /// meaningful across runs.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.chunk.x.to_le_bytes());
        hasher.update(self.chunk.y.to_le_bytes());
        for pixel in &self.pixels {
            hasher.update(pixel.x.to_le_bytes());
            hasher.update(pixel.y.to_le_bytes());
            hasher.update([pixel.color_id]);
        }

        hex::encode(hasher.finalize())
    }
}

/// Immutable id -> RGB table. Id 0 is the transparent slot and never matches.
#[derive(Clone, Debug)]
pub struct Palette {
    colors: Vec<Option<[u8; 3]>>,
}

impl Palette {
    pub fn new(colors: Vec<Option<[u8; 3]>>) -> Self {
        Self { colors }
    }

    /// The 32 entry wplace palette.
    pub fn wplace() -> Self {
        Self::new(vec![
            None,
            Some([0, 0, 0]),
            Some([60, 60, 60]),
            Some([120, 120, 120]),
            Some([210, 210, 210]),
            Some([255, 255, 255]),
            Some([96, 0, 24]),
            Some([237, 28, 36]),
            Some([255, 127, 39]),
            Some([246, 170, 9]),
            Some([249, 221, 59]),
            Some([255, 250, 188]),
            Some([14, 185, 104]),
            Some([19, 230, 123]),
            Some([135, 255, 94]),
            Some([12, 129, 110]),
            Some([16, 174, 166]),
            Some([19, 225, 190]),
            Some([40, 80, 158]),
            Some([64, 147, 228]),
            Some([96, 247, 242]),
            Some([107, 80, 246]),
            Some([153, 177, 251]),
            Some([120, 12, 153]),
            Some([170, 56, 185]),
            Some([224, 159, 249]),
            Some([203, 0, 122]),
            Some([236, 31, 128]),
            Some([243, 141, 169]),
            Some([104, 70, 52]),
            Some([149, 104, 42]),
            Some([248, 178, 119]),
        ])
    }

    pub fn rgb(&self, id: u8) -> Option<[u8; 3]> {
        self.colors.get(id as usize).copied().flatten()
    }

    /// Nearest palette id by squared RGB distance, lowest id wins ties.
    ///
    /// Returns 0 only when the palette has no opaque entries.
    pub fn nearest(&self, [r, g, b]: [u8; 3]) -> u8 {
        let mut best = (0, u32::MAX);
        for (id, entry) in self.colors.iter().enumerate() {
            let Some([pr, pg, pb]) = entry else {
                continue;
            };

            let dr = i32::from(*pr) - i32::from(r);
            let dg = i32::from(*pg) - i32::from(g);
            let db = i32::from(*pb) - i32::from(b);
            let dist = (dr * dr + dg * dg + db * db) as u32;
            if dist < best.1 {
                best = (id as u8, dist);
            }
        }

        best.0
    }
}
