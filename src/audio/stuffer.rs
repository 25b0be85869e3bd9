// ABOUTME: ±1-sample frame stuffing, basic splice and resampling variants
// ABOUTME: All samples pass through the dithered volume scaler on the way out

use rand::Rng;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::audio::volume::Ditherer;
use crate::audio::CHANNELS;
use crate::error::Error;
use crate::Result;

/// Stereo samples kept verbatim at each block edge of a resampled frame to
/// suppress Gibbs ringing.
const EDGE_GUARD: usize = 5;

/// Integer mean of two samples, computed wide.
#[inline]
pub fn shortmean(a: i16, b: i16) -> i16 {
    let mean = (a as i32 + b as i32) / 2;
    debug_assert!(mean >= i16::MIN as i32 && mean <= i16::MAX as i32);
    mean as i16
}

/// Linear ±1-sample stuffer.
///
/// Copies `input` (one packet of interleaved stereo) to `output` through the
/// dithered volume scaler, inserting an interpolated stereo sample or
/// removing one at a splice point chosen uniformly inside the frame.
/// Returns the number of stereo frames written.
pub fn stuff_basic<R: Rng>(
    input: &[i16],
    output: &mut [i16],
    stuff: i32,
    fix_volume: i32,
    dither: &mut Ditherer,
    rng: &mut R,
) -> usize {
    let frame_size = input.len() / CHANNELS;
    debug_assert!((-1..=1).contains(&stuff));
    let stuff = stuff.clamp(-1, 1);

    // Keep at least one sample on each side of the splice.
    let stuffsamp = if stuff != 0 {
        rng.gen_range(1..frame_size - 1)
    } else {
        frame_size
    };

    let mut o = 0;
    for frame in input[..stuffsamp * CHANNELS].chunks_exact(CHANNELS) {
        output[o] = dither.apply(frame[0], fix_volume);
        output[o + 1] = dither.apply(frame[1], fix_volume);
        o += CHANNELS;
    }

    if stuff != 0 {
        let mut resume = stuffsamp;
        if stuff == 1 {
            // Interpolate one stereo sample between its neighbours.
            let k = stuffsamp * CHANNELS;
            output[o] = dither.apply(shortmean(input[k - 2], input[k]), fix_volume);
            output[o + 1] = dither.apply(shortmean(input[k - 1], input[k + 1]), fix_volume);
            o += CHANNELS;
        } else {
            // Drop one stereo sample.
            resume += 1;
        }
        for frame in input[resume * CHANNELS..].chunks_exact(CHANNELS) {
            output[o] = dither.apply(frame[0], fix_volume);
            output[o + 1] = dither.apply(frame[1], fix_volume);
            o += CHANNELS;
        }
    }

    (frame_size as i64 + stuff as i64) as usize
}

/// Resampling ±1-sample stuffer.
///
/// One-shot resample of the whole packet from `frame_size` to
/// `frame_size + stuff` stereo frames at the nominal rate, with the first
/// and last [`EDGE_GUARD`] stereo samples overwritten by the raw input. The
/// volume scaler only runs when the software mixer is engaged.
pub fn stuff_resample(
    input: &[i16],
    output: &mut [i16],
    stuff: i32,
    software_mixer_volume: f64,
    fix_volume: i32,
    dither: &mut Ditherer,
) -> Result<usize> {
    let frame_size = input.len() / CHANNELS;
    debug_assert!((-1..=1).contains(&stuff));
    let stuff = stuff.clamp(-1, 1);

    if stuff == 0 {
        for (out, &s) in output[..input.len()].iter_mut().zip(input) {
            *out = dither.apply(s, fix_volume);
        }
        return Ok(frame_size);
    }

    let out_frames = (frame_size as i64 + stuff as i64) as usize;

    let mut planar = [
        Vec::with_capacity(frame_size),
        Vec::with_capacity(frame_size),
    ];
    for frame in input.chunks_exact(CHANNELS) {
        planar[0].push(frame[0] as f32 / 32768.0);
        planar[1].push(frame[1] as f32 / 32768.0);
    }

    let ratio = out_frames as f64 / frame_size as f64;
    let mut resampler =
        FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Septic, frame_size, CHANNELS)
            .map_err(|e| Error::Resample(e.to_string()))?;
    let mut resampled = resampler
        .process(&planar, None)
        .map_err(|e| Error::Resample(e.to_string()))?;

    // The resampler may hold a few samples back; drain until the output
    // frame count is covered.
    for _ in 0..2 {
        if resampled[0].len() >= out_frames {
            break;
        }
        let more = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| Error::Resample(e.to_string()))?;
        if more[0].is_empty() {
            break;
        }
        resampled[0].extend_from_slice(&more[0]);
        resampled[1].extend_from_slice(&more[1]);
    }

    for i in 0..out_frames {
        for ch in 0..CHANNELS {
            let s = resampled[ch]
                .get(i)
                .or_else(|| resampled[ch].last())
                .copied()
                .unwrap_or(0.0);
            output[i * CHANNELS + ch] = (s * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
        }
    }

    // Keep the block edges verbatim.
    let guard = EDGE_GUARD.min(out_frames).min(frame_size);
    for i in 0..guard {
        output[i * CHANNELS] = input[i * CHANNELS];
        output[i * CHANNELS + 1] = input[i * CHANNELS + 1];
        let oi = (out_frames - 1 - i) * CHANNELS;
        let ii = (frame_size - 1 - i) * CHANNELS;
        output[oi] = input[ii];
        output[oi + 1] = input[ii + 1];
    }

    if software_mixer_volume != 1.0 {
        for s in output[..out_frames * CHANNELS].iter_mut() {
            *s = dither.apply(*s, fix_volume);
        }
    }

    Ok(out_frames)
}
