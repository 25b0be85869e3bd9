use backbeat::audio::stuffer::{shortmean, stuff_basic, stuff_resample};
use backbeat::audio::volume::{Ditherer, UNITY_VOLUME};

const FRAME_SIZE: usize = 352;

/// Strictly increasing stereo signal whose left-channel samples are all
/// multiples of four; an interpolated (mean) left sample lands on `2 mod 4`
/// and is therefore identifiable.
fn ramp() -> Vec<i16> {
    (0..FRAME_SIZE * 2).map(|i| (i as i16) * 2).collect()
}

#[test]
fn test_shortmean() {
    assert_eq!(shortmean(2, 4), 3);
    assert_eq!(shortmean(3, 4), 3);
    assert_eq!(shortmean(-5, -7), -6);
    assert_eq!(shortmean(i16::MAX, i16::MAX), i16::MAX);
    assert_eq!(shortmean(i16::MIN, i16::MIN), i16::MIN);
}

#[test]
fn test_basic_no_stuff_is_identity_at_unity() {
    let input = ramp();
    let mut output = vec![0i16; (FRAME_SIZE + 1) * 2];
    let mut dither = Ditherer::new();
    let mut rng = rand::thread_rng();

    let frames = stuff_basic(
        &input,
        &mut output,
        0,
        UNITY_VOLUME,
        &mut dither,
        &mut rng,
    );
    assert_eq!(frames, FRAME_SIZE);
    assert_eq!(&output[..FRAME_SIZE * 2], &input[..]);
}

#[test]
fn test_basic_insert_lengthens_by_one() {
    let input = ramp();
    let mut output = vec![0i16; (FRAME_SIZE + 1) * 2];
    let mut dither = Ditherer::new();
    let mut rng = rand::thread_rng();

    let frames = stuff_basic(
        &input,
        &mut output,
        1,
        UNITY_VOLUME,
        &mut dither,
        &mut rng,
    );
    assert_eq!(frames, FRAME_SIZE + 1);

    // Exactly one inserted stereo sample, interpolated between its
    // neighbours, with the input intact on both sides of it.
    let splice = output
        .chunks_exact(2)
        .position(|frame| frame[0] % 4 != 0)
        .expect("no interpolated sample found");
    assert!(splice >= 1 && splice <= FRAME_SIZE - 2);
    assert_eq!(&output[..splice * 2], &input[..splice * 2]);
    assert_eq!(
        output[splice * 2],
        shortmean(input[splice * 2 - 2], input[splice * 2])
    );
    assert_eq!(
        output[splice * 2 + 1],
        shortmean(input[splice * 2 - 1], input[splice * 2 + 1])
    );
    assert_eq!(&output[(splice + 1) * 2..frames * 2], &input[splice * 2..]);
}

#[test]
fn test_basic_drop_shortens_by_one() {
    let input = ramp();
    let mut output = vec![0i16; (FRAME_SIZE + 1) * 2];
    let mut dither = Ditherer::new();
    let mut rng = rand::thread_rng();

    let frames = stuff_basic(
        &input,
        &mut output,
        -1,
        UNITY_VOLUME,
        &mut dither,
        &mut rng,
    );
    assert_eq!(frames, FRAME_SIZE - 1);

    // One stereo sample is missing; everything else survives in order.
    let skip = output
        .chunks_exact(2)
        .zip(input.chunks_exact(2))
        .position(|(out, inp)| out[0] != inp[0])
        .expect("no dropped sample found");
    assert_eq!(&output[..skip * 2], &input[..skip * 2]);
    assert_eq!(&output[skip * 2..frames * 2], &input[(skip + 1) * 2..]);
}

#[test]
fn test_basic_attenuation_scales_with_dither() {
    let input = vec![1000i16; FRAME_SIZE * 2];
    let mut output = vec![0i16; (FRAME_SIZE + 1) * 2];
    let mut dither = Ditherer::new();
    let mut rng = rand::thread_rng();

    // Half volume: every output sample lands on 500 give or take the
    // couple of steps the triangular dither spans.
    let frames = stuff_basic(&input, &mut output, 0, 0x8000, &mut dither, &mut rng);
    assert_eq!(frames, FRAME_SIZE);
    for &s in &output[..FRAME_SIZE * 2] {
        assert!((498..=500).contains(&s), "sample {} out of range", s);
    }
}

#[test]
fn test_resample_no_stuff_is_identity_at_unity() {
    let input = ramp();
    let mut output = vec![0i16; (FRAME_SIZE + 1) * 2];
    let mut dither = Ditherer::new();

    let frames = stuff_resample(&input, &mut output, 0, 1.0, UNITY_VOLUME, &mut dither).unwrap();
    assert_eq!(frames, FRAME_SIZE);
    assert_eq!(&output[..FRAME_SIZE * 2], &input[..]);
}

#[test]
fn test_resample_insert_length_and_edges() {
    let input: Vec<i16> = (0..FRAME_SIZE * 2)
        .map(|i| ((i / 2) as f32 * 0.12).sin().mul_add(12000.0, 0.0) as i16)
        .collect();
    let mut output = vec![0i16; (FRAME_SIZE + 1) * 2];
    let mut dither = Ditherer::new();

    let frames = stuff_resample(&input, &mut output, 1, 1.0, UNITY_VOLUME, &mut dither).unwrap();
    assert_eq!(frames, FRAME_SIZE + 1);

    // The first and last five stereo samples are the raw input.
    assert_eq!(&output[..10], &input[..10]);
    assert_eq!(&output[(frames - 5) * 2..frames * 2], &input[(FRAME_SIZE - 5) * 2..]);
}

#[test]
fn test_resample_drop_length_and_edges() {
    let input: Vec<i16> = (0..FRAME_SIZE * 2)
        .map(|i| ((i / 2) as f32 * 0.07).cos().mul_add(9000.0, 0.0) as i16)
        .collect();
    let mut output = vec![0i16; (FRAME_SIZE + 1) * 2];
    let mut dither = Ditherer::new();

    let frames = stuff_resample(&input, &mut output, -1, 1.0, UNITY_VOLUME, &mut dither).unwrap();
    assert_eq!(frames, FRAME_SIZE - 1);
    assert_eq!(&output[..10], &input[..10]);
    assert_eq!(&output[(frames - 5) * 2..frames * 2], &input[(FRAME_SIZE - 5) * 2..]);
}
