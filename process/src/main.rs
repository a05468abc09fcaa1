#[macro_use]
extern crate tracing;

use anyhow::{Context, ensure};
use image::{GenericImageView, Pixel as _, RgbaImage};
use itertools::Itertools;
use std::{
    collections::HashSet,
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};
use wplacer_common::{CHUNK_SIZE, ChunkAddr, Palette, Pixel, PixelPlan};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Pixels below this alpha are treated as transparent and never drawn.
const ALPHA_CUTOFF: u8 = 128;

#[derive(argh::FromArgs)]
/// quantize an image into a pixel plan to be drawn by wplacer
struct Args {
    #[argh(positional)]
    /// path to the image file
    path: PathBuf,

    #[argh(option)]
    /// path to output file
    output: PathBuf,

    #[argh(option)]
    /// primary chunk x
    chunk_x: u32,

    #[argh(option)]
    /// sub-chunk y
    chunk_y: u32,

    #[argh(option, default = "0")]
    /// start offset x inside the chunk (0-999)
    start_x: u32,

    #[argh(option, default = "0")]
    /// start offset y inside the chunk (0-999)
    start_y: u32,

    #[argh(option, default = "String::new()")]
    /// colors to ignore, as 'R,G,B R,G,B'
    ignore: String,
}

/// Parse whitespace separated `R,G,B` triples, skipping anything malformed.
fn parse_ignored_colors(raw: &str) -> HashSet<[u8; 3]> {
    raw.split_whitespace()
        .filter_map(|entry| {
            let parsed = entry
                .split(',')
                .map(|part| part.trim().parse::<u8>())
                .collect_tuple();

            match parsed {
                Some((Ok(r), Ok(g), Ok(b))) => Some([r, g, b]),
                _ => {
                    warn!(%entry, "skipping invalid color");
                    None
                }
            }
        })
        .collect()
}

struct Placement {
    chunk: ChunkAddr,
    start_x: u32,
    start_y: u32,
}

/// Turn an image into the ordered list of drawable pixels.
///
/// Pixels are emitted row by row, left to right. The image has to fit inside
/// the chunk; spilling into a neighbour would need a second endpoint.
fn quantize(
    image: &RgbaImage,
    palette: &Palette,
    ignored: &HashSet<[u8; 3]>,
    placement: &Placement,
) -> anyhow::Result<PixelPlan> {
    let (width, height) = image.dimensions();
    ensure!(
        placement.start_x < CHUNK_SIZE && placement.start_y < CHUNK_SIZE,
        "start offset ({}, {}) is outside the chunk",
        placement.start_x,
        placement.start_y,
    );
    ensure!(
        placement.start_x + width <= CHUNK_SIZE && placement.start_y + height <= CHUNK_SIZE,
        "{width}x{height} image at ({}, {}) does not fit in a {CHUNK_SIZE}px chunk",
        placement.start_x,
        placement.start_y,
    );

    let mut pixels = Vec::new();
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        if a < ALPHA_CUTOFF || ignored.contains(&[r, g, b]) {
            continue;
        }

        let abs_x = placement.chunk.x * CHUNK_SIZE + placement.start_x + x;
        let abs_y = placement.chunk.y * CHUNK_SIZE + placement.start_y + y;
        pixels.push(Pixel {
            x: abs_x % CHUNK_SIZE,
            y: abs_y % CHUNK_SIZE,
            color_id: palette.nearest(pixel.to_rgb().0),
        });
    }

    Ok(PixelPlan::new(placement.chunk, pixels))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args: Args = argh::from_env();

    let image = image::open(&args.path)
        .with_context(|| format!("failed to open {}", args.path.display()))?;
    let (width, height) = image.dimensions();
    info!(width, height, "loaded image");

    let ignored = parse_ignored_colors(&args.ignore);
    if ignored.is_empty() {
        info!("no ignored colors");
    } else {
        info!(?ignored, "ignoring colors");
    }

    let placement = Placement {
        chunk: ChunkAddr {
            x: args.chunk_x,
            y: args.chunk_y,
        },
        start_x: args.start_x,
        start_y: args.start_y,
    };
    let plan = quantize(&image.to_rgba8(), &Palette::wplace(), &ignored, &placement)?;
    info!(
        pixels = plan.len(),
        fingerprint = %plan.fingerprint(),
        "quantized image"
    );

    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&plan)?;
    let file = File::create(&args.output)?;
    let mut file = BufWriter::new(file);
    file.write_all(&bytes)?;
    file.flush()?;

    Ok(())
}
