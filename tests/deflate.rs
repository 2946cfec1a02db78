use std::io::Read;

use quickcheck::{Arbitrary, Gen, TestResult};
use rand::{rngs::StdRng, RngCore, SeedableRng};

use zflate::{
    adler32,
    deflate::{compress_bound, compress_slice, DeflateConfig, DeflateStream, Strategy},
    Flush, ReturnCode,
};

fn inflate(compressed: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    flate2::read::ZlibDecoder::new(compressed)
        .read_to_end(&mut out)
        .expect("valid zlib stream");
    out
}

fn inflate_raw(compressed: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    flate2::read::DeflateDecoder::new(compressed)
        .read_to_end(&mut out)
        .expect("valid raw deflate stream");
    out
}

fn deflate_all(input: &[u8], config: DeflateConfig) -> Vec<u8> {
    let mut output = vec![0; compress_bound(input.len())];
    let (compressed, err) = compress_slice(&mut output, input, config);
    assert_eq!(err, ReturnCode::Ok);
    let len = compressed.len();
    output.truncate(len);
    output
}

/// Drive a stream with bounded input and output chunks, applying `flush`
/// between input chunks and `Flush::Finish` at the end.
fn deflate_chunked(
    input: &[u8],
    config: DeflateConfig,
    chunk_in: usize,
    chunk_out: usize,
    flush: Flush,
) -> Vec<u8> {
    let mut stream = DeflateStream::new(config).unwrap();
    let mut out = vec![0; compress_bound(input.len()) + 1024];
    let mut in_pos = 0;
    let mut out_pos = 0;

    while in_pos < input.len() {
        let end = Ord::min(in_pos + chunk_in, input.len());
        loop {
            let out_end = Ord::min(out_pos + chunk_out, out.len());
            let result = stream.deflate(
                &input[in_pos..end],
                &mut out[out_pos..out_end],
                flush,
            );
            assert_ne!(result.return_code, ReturnCode::StreamError);
            in_pos += result.bytes_consumed;
            out_pos += result.bytes_written;
            if in_pos == end && result.bytes_written < chunk_out {
                break;
            }
        }
    }

    loop {
        let out_end = Ord::min(out_pos + chunk_out, out.len());
        let result = stream.deflate(
            &[],
            &mut out[out_pos..out_end],
            Flush::Finish,
        );
        out_pos += result.bytes_written;
        match result.return_code {
            ReturnCode::Ok => continue,
            ReturnCode::StreamEnd => break,
            err => panic!("unexpected {err:?}"),
        }
    }

    assert_eq!(stream.total_in(), input.len() as u64);
    assert_eq!(stream.total_out(), out_pos as u64);
    assert_eq!(stream.end(), ReturnCode::Ok);

    out.truncate(out_pos);
    out
}

fn repetitive_corpus(len: usize) -> Vec<u8> {
    b"ABC".iter().copied().cycle().take(len).collect()
}

fn random_corpus(len: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0; len];
    StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    data
}

fn text_corpus(len: usize) -> Vec<u8> {
    let paragraph = b"It is a truth universally acknowledged, that a single \
        man in possession of a good fortune, must be in want of a wife. \
        However little known the feelings or views of such a man may be \
        on his first entering a neighbourhood, this truth is so well fixed \
        in the minds of the surrounding families.\n";
    paragraph.iter().copied().cycle().take(len).collect()
}

#[test]
fn empty_input_produces_the_minimal_stream() {
    let compressed = deflate_all(b"", DeflateConfig::new(6));

    assert_eq!(compressed, [0x78, 0x9C, 0x03, 0x00, 0x00, 0x00, 0x00, 0x01]);
    assert_eq!(inflate(&compressed), b"");
}

#[test]
fn round_trip_all_levels() {
    let input = text_corpus(100_000);

    for level in 0..=9 {
        let compressed = deflate_all(&input, DeflateConfig::new(level));
        assert_eq!(inflate(&compressed), input, "level {level}");
    }
}

#[test]
fn zeroes_compress_and_higher_levels_do_not_lose() {
    let input = vec![0u8; 32 * 1024];

    let level1 = deflate_all(&input, DeflateConfig::new(1));
    let level9 = deflate_all(&input, DeflateConfig::new(9));

    assert_eq!(inflate(&level1), input);
    assert_eq!(inflate(&level9), input);
    assert!(level9.len() <= level1.len());
    assert!(level1.len() < 1024);
}

#[test]
fn repetitive_input_compresses_below_one_percent() {
    let input = repetitive_corpus(30_000);

    let compressed = deflate_all(&input, DeflateConfig::new(6));

    assert_eq!(inflate(&compressed), input);
    assert!(
        compressed.len() < input.len() / 100,
        "{} bytes from {}",
        compressed.len(),
        input.len()
    );
}

#[test]
fn random_input_stays_within_bound() {
    let input = random_corpus(64 * 1024, 0x5eed);

    let compressed = deflate_all(&input, DeflateConfig::default());

    assert_eq!(inflate(&compressed), input);
    assert!(compressed.len() <= compress_bound(input.len()));
}

#[test]
fn parameter_matrix_round_trips() {
    let input = text_corpus(10_000);

    for level in [0, 1, 6, 9] {
        for window_bits in [9, 15] {
            for mem_level in [1, 8] {
                let config = DeflateConfig {
                    level,
                    window_bits,
                    mem_level,
                    strategy: Strategy::Default,
                };
                let compressed = deflate_all(&input, config);
                assert_eq!(
                    inflate(&compressed),
                    input,
                    "level {level} wbits {window_bits} mem {mem_level}"
                );
            }
        }
    }
}

#[test]
fn negative_window_bits_produce_raw_deflate() {
    let input = text_corpus(20_000);

    let config = DeflateConfig {
        window_bits: -15,
        ..DeflateConfig::new(6)
    };
    let compressed = deflate_all(&input, config);

    // no zlib framing at all
    assert_eq!(inflate_raw(&compressed), input);
}

#[test]
fn strategies_round_trip() {
    let input = text_corpus(20_000);

    for strategy in [Strategy::Default, Strategy::Filtered, Strategy::HuffmanOnly] {
        let config = DeflateConfig {
            strategy,
            ..DeflateConfig::new(6)
        };
        let compressed = deflate_all(&input, config);
        assert_eq!(inflate(&compressed), input, "{strategy:?}");
    }
}

#[test]
fn huffman_only_never_emits_matches() {
    // with no matcher, even highly repetitive data cannot shrink below the
    // entropy of its single-byte distribution
    let input = repetitive_corpus(30_000);

    let config = DeflateConfig {
        strategy: Strategy::HuffmanOnly,
        ..DeflateConfig::new(6)
    };
    let huffman = deflate_all(&input, config);
    let matched = deflate_all(&input, DeflateConfig::new(6));

    assert_eq!(inflate(&huffman), input);
    assert!(huffman.len() > input.len() / 8);
    assert!(matched.len() < huffman.len());
}

#[test]
fn one_byte_per_call_matches_single_shot() {
    let input = text_corpus(4_000);

    let single = deflate_all(&input, DeflateConfig::new(6));
    let chunked = deflate_chunked(&input, DeflateConfig::new(6), 1, 4096, Flush::NoFlush);

    assert_eq!(chunked, single);
    assert_eq!(inflate(&chunked), input);
}

#[test]
fn one_byte_of_output_per_call_matches_single_shot() {
    let input = text_corpus(4_000);

    let single = deflate_all(&input, DeflateConfig::new(6));
    let chunked = deflate_chunked(&input, DeflateConfig::new(6), 4096, 1, Flush::NoFlush);

    assert_eq!(chunked, single);
}

#[test]
fn stored_level_spans_multiple_blocks() {
    // well past the 65535 byte stored-block limit
    let input = random_corpus(200_000, 7);

    let compressed = deflate_all(&input, DeflateConfig::new(0));

    assert_eq!(inflate(&compressed), input);
    assert!(compressed.len() > input.len());
    assert!(compressed.len() < input.len() + 64);
}

#[test]
fn sync_flush_emits_the_marker_and_continues() {
    let part1 = text_corpus(5_000);
    let part2 = repetitive_corpus(5_000);

    let mut stream = DeflateStream::new(DeflateConfig::new(6)).unwrap();
    let mut out = vec![0; 32 * 1024];
    let mut out_pos = 0;

    let result = stream.deflate(&part1, &mut out, Flush::SyncFlush);
    assert_eq!(result.return_code, ReturnCode::Ok);
    assert_eq!(result.bytes_consumed, part1.len());
    out_pos += result.bytes_written;

    assert_eq!(
        &out[out_pos - 4..out_pos],
        &[0x00, 0x00, 0xFF, 0xFF],
        "sync flush must end on the empty stored block marker"
    );

    let result = stream.deflate(&part2, &mut out[out_pos..], Flush::Finish);
    assert_eq!(result.return_code, ReturnCode::StreamEnd);
    out_pos += result.bytes_written;
    stream.end();

    let expected: Vec<u8> = part1.iter().chain(&part2).copied().collect();
    assert_eq!(inflate(&out[..out_pos]), expected);
}

#[test]
fn partial_flush_round_trips() {
    let part1 = text_corpus(3_000);
    let part2 = text_corpus(3_000);

    let mut stream = DeflateStream::new(DeflateConfig::new(6)).unwrap();
    let mut out = vec![0; 32 * 1024];
    let mut out_pos = 0;

    for part in [&part1, &part2] {
        let result = stream.deflate(part, &mut out[out_pos..], Flush::PartialFlush);
        assert_eq!(result.return_code, ReturnCode::Ok);
        assert_eq!(result.bytes_consumed, part.len());
        out_pos += result.bytes_written;
    }

    let result = stream.deflate(&[], &mut out[out_pos..], Flush::Finish);
    assert_eq!(result.return_code, ReturnCode::StreamEnd);
    out_pos += result.bytes_written;
    stream.end();

    let expected: Vec<u8> = part1.iter().chain(&part2).copied().collect();
    assert_eq!(inflate(&out[..out_pos]), expected);
}

#[test]
fn full_flush_makes_the_tail_independent() {
    let part1 = repetitive_corpus(8_000);
    let part2 = b"xyzzy plugh "
        .iter()
        .copied()
        .cycle()
        .take(8_000)
        .collect::<Vec<u8>>();

    // raw deflate so the tail segment is a bare block sequence
    let config = DeflateConfig {
        window_bits: -15,
        ..DeflateConfig::new(6)
    };
    let mut stream = DeflateStream::new(config).unwrap();
    let mut out = vec![0; 64 * 1024];

    let result = stream.deflate(&part1, &mut out, Flush::FullFlush);
    assert_eq!(result.return_code, ReturnCode::Ok);
    let boundary = result.bytes_written;

    let result = stream.deflate(&part2, &mut out[boundary..], Flush::Finish);
    assert_eq!(result.return_code, ReturnCode::StreamEnd);
    let end = boundary + result.bytes_written;
    stream.end();

    // the whole stream decodes to both parts
    let expected: Vec<u8> = part1.iter().chain(&part2).copied().collect();
    assert_eq!(inflate_raw(&out[..end]), expected);

    // after a full flush the compressor has forgotten part1, so the tail
    // decodes on its own with no preceding history
    assert_eq!(inflate_raw(&out[boundary..end]), part2);
}

#[test]
fn adler_trailer_matches_the_input() {
    let input = text_corpus(10_000);

    let compressed = deflate_all(&input, DeflateConfig::new(6));

    let trailer = u32::from_be_bytes(compressed[compressed.len() - 4..].try_into().unwrap());
    assert_eq!(trailer, adler32(1, &input));
}

#[test]
fn header_is_valid_for_all_levels() {
    for level in 0..=9 {
        let compressed = deflate_all(b"header check", DeflateConfig::new(level));

        let header = u16::from_be_bytes([compressed[0], compressed[1]]);
        assert_eq!(header % 31, 0, "level {level}");
        assert_eq!(compressed[0] & 0x0f, 8, "CM must be deflate");
        assert_eq!(compressed[0] >> 4, 7, "CINFO for the default 32k window");
    }
}

#[test]
fn totals_accumulate_monotonically() {
    let input = text_corpus(10_000);

    let mut stream = DeflateStream::new(DeflateConfig::new(6)).unwrap();
    let mut out = vec![0; 32 * 1024];
    let mut out_pos = 0;
    let mut last_totals = (0, 0);

    for chunk in input.chunks(997) {
        let result = stream.deflate(chunk, &mut out[out_pos..], Flush::NoFlush);
        assert_eq!(result.return_code, ReturnCode::Ok);
        out_pos += result.bytes_written;

        let totals = (stream.total_in(), stream.total_out());
        assert!(totals >= last_totals);
        last_totals = totals;
    }

    let result = stream.deflate(&[], &mut out[out_pos..], Flush::Finish);
    assert_eq!(result.return_code, ReturnCode::StreamEnd);
    out_pos += result.bytes_written;

    assert_eq!(stream.total_in(), input.len() as u64);
    assert_eq!(stream.total_out(), out_pos as u64);
    stream.end();
}

#[test]
fn stream_end_is_idempotent() {
    let mut stream = DeflateStream::new(DeflateConfig::new(6)).unwrap();
    let mut out = vec![0; 1024];

    let result = stream.deflate(b"some data", &mut out, Flush::Finish);
    assert_eq!(result.return_code, ReturnCode::StreamEnd);

    for _ in 0..3 {
        let result = stream.deflate(&[], &mut out, Flush::Finish);
        assert_eq!(result.return_code, ReturnCode::StreamEnd);
        assert_eq!(result.bytes_written, 0);
    }

    assert_eq!(stream.end(), ReturnCode::Ok);
}

#[test]
fn input_after_finish_is_a_stream_error() {
    let mut stream = DeflateStream::new(DeflateConfig::new(6)).unwrap();
    let mut out = vec![0; 1024];

    let result = stream.deflate(b"some data", &mut out, Flush::Finish);
    assert_eq!(result.return_code, ReturnCode::StreamEnd);

    let result = stream.deflate(b"more data", &mut out, Flush::Finish);
    assert_eq!(result.return_code, ReturnCode::StreamError);
    assert!(stream.msg().is_some());

    // a non-finish flush after finishing is also a usage error
    let result = stream.deflate(&[], &mut out, Flush::NoFlush);
    assert_eq!(result.return_code, ReturnCode::StreamError);
    stream.end();
}

#[test]
fn backpressure_is_a_recoverable_buf_error() {
    let mut stream = DeflateStream::new(DeflateConfig::new(6)).unwrap();

    // zero output space on entry
    let result = stream.deflate(b"data", &mut [], Flush::NoFlush);
    assert_eq!(result.return_code, ReturnCode::BufError);

    // a repeated NoFlush call with nothing to do
    let mut out = vec![0; 1024];
    let result = stream.deflate(b"data", &mut out, Flush::NoFlush);
    assert_eq!(result.return_code, ReturnCode::Ok);
    let result = stream.deflate(&[], &mut out, Flush::NoFlush);
    assert_eq!(result.return_code, ReturnCode::BufError);

    // the error is not fatal; finishing still works
    let result = stream.deflate(&[], &mut out, Flush::Finish);
    assert_eq!(result.return_code, ReturnCode::StreamEnd);
    stream.end();
}

#[test]
fn invalid_configurations_are_rejected() {
    for config in [
        DeflateConfig {
            level: 10,
            ..DeflateConfig::default()
        },
        DeflateConfig {
            window_bits: 8,
            ..DeflateConfig::default()
        },
        DeflateConfig {
            window_bits: 16,
            ..DeflateConfig::default()
        },
        DeflateConfig {
            window_bits: -16,
            ..DeflateConfig::default()
        },
        DeflateConfig {
            mem_level: 0,
            ..DeflateConfig::default()
        },
        DeflateConfig {
            mem_level: 10,
            ..DeflateConfig::default()
        },
    ] {
        assert!(
            DeflateStream::new(config).is_err(),
            "{config:?} should be rejected"
        );
    }
}

#[test]
fn abandoning_a_stream_reports_data_error() {
    let mut stream = DeflateStream::new(DeflateConfig::new(6)).unwrap();
    let mut out = vec![0; 1024];

    let result = stream.deflate(b"unfinished business", &mut out, Flush::NoFlush);
    assert_eq!(result.return_code, ReturnCode::Ok);

    assert_eq!(stream.end(), ReturnCode::DataError);
}

#[test]
fn reset_reuses_the_session() {
    let input = text_corpus(5_000);
    let mut stream = DeflateStream::new(DeflateConfig::new(6)).unwrap();
    let mut first = vec![0; 16 * 1024];
    let mut second = vec![0; 16 * 1024];

    let result = stream.deflate(&input, &mut first, Flush::Finish);
    assert_eq!(result.return_code, ReturnCode::StreamEnd);
    first.truncate(result.bytes_written);

    assert_eq!(stream.reset(), ReturnCode::Ok);
    assert_eq!(stream.total_in(), 0);

    let result = stream.deflate(&input, &mut second, Flush::Finish);
    assert_eq!(result.return_code, ReturnCode::StreamEnd);
    second.truncate(result.bytes_written);
    stream.end();

    assert_eq!(first, second, "a reset stream compresses identically");
    assert_eq!(inflate(&second), input);
}

#[test]
fn params_switch_mid_stream() {
    let input = text_corpus(40_000);
    let (head, tail) = input.split_at(20_000);

    let mut stream = DeflateStream::new(DeflateConfig::new(1)).unwrap();
    let mut out = vec![0; 64 * 1024];
    let mut out_pos = 0;

    let result = stream.deflate(head, &mut out, Flush::NoFlush);
    assert_eq!(result.return_code, ReturnCode::Ok);
    assert_eq!(result.bytes_consumed, head.len());
    out_pos += result.bytes_written;

    assert_eq!(stream.params(9, Strategy::Default), ReturnCode::Ok);

    let result = stream.deflate(tail, &mut out[out_pos..], Flush::Finish);
    assert_eq!(result.return_code, ReturnCode::StreamEnd);
    out_pos += result.bytes_written;
    stream.end();

    assert_eq!(inflate(&out[..out_pos]), input);
}

#[test]
fn params_without_processed_data_switches_silently() {
    let mut stream = DeflateStream::new(DeflateConfig::new(1)).unwrap();
    assert_eq!(stream.params(9, Strategy::Filtered), ReturnCode::Ok);

    let input = text_corpus(5_000);
    let mut out = vec![0; 16 * 1024];
    let result = stream.deflate(&input, &mut out, Flush::Finish);
    assert_eq!(result.return_code, ReturnCode::StreamEnd);
    stream.end();

    assert_eq!(inflate(&out[..result.bytes_written]), input);
}

#[test]
fn preset_dictionary_is_announced_and_used() {
    let dictionary = b"The quick brown fox";
    let input = b"The quick brown fox jumps over the lazy dog";

    let mut stream = DeflateStream::new(DeflateConfig::new(6)).unwrap();
    assert_eq!(stream.set_dictionary(dictionary), ReturnCode::Ok);

    let mut out = vec![0; 1024];
    let result = stream.deflate(input, &mut out, Flush::Finish);
    assert_eq!(result.return_code, ReturnCode::StreamEnd);
    let compressed = &out[..result.bytes_written];
    let trailer_adler = stream.adler();
    stream.end();

    // FDICT is announced and the header stays divisible by 31
    assert_eq!(compressed[1] & 0x20, 0x20);
    let header = u16::from_be_bytes([compressed[0], compressed[1]]);
    assert_eq!(header % 31, 0);

    // the 4 bytes after the header identify the dictionary
    let dict_id = u32::from_be_bytes(compressed[2..6].try_into().unwrap());
    assert_eq!(dict_id, adler32(1, dictionary));

    // the trailer covers the content only, not the dictionary
    let trailer = u32::from_be_bytes(compressed[compressed.len() - 4..].try_into().unwrap());
    assert_eq!(trailer, adler32(1, input));
    assert_eq!(trailer, trailer_adler);

    // the dictionary must have been matched against: the same input without
    // it cannot reference "The quick brown fox" and compresses worse
    let without = deflate_all(input, DeflateConfig::new(6));
    assert!(compressed.len() < without.len());
}

#[test]
fn set_dictionary_after_data_is_rejected() {
    let mut stream = DeflateStream::new(DeflateConfig::new(6)).unwrap();
    let mut out = vec![0; 1024];

    stream.deflate(b"too late", &mut out, Flush::NoFlush);
    assert_eq!(stream.set_dictionary(b"dictionary"), ReturnCode::StreamError);
    stream.end();
}

#[test]
fn large_dictionary_keeps_the_tail() {
    let mut dictionary = random_corpus(64 * 1024, 3);
    let tail = b"needle needle needle";
    dictionary.extend_from_slice(tail);

    let mut stream = DeflateStream::new(DeflateConfig::new(6)).unwrap();
    assert_eq!(stream.set_dictionary(&dictionary), ReturnCode::Ok);

    let mut out = vec![0; 1024];
    let result = stream.deflate(b"needle needle needle", &mut out, Flush::Finish);
    assert_eq!(result.return_code, ReturnCode::StreamEnd);

    // matching against the dictionary tail beats a literal rendition
    assert!(result.bytes_written < 24);
    stream.end();
}

#[derive(Debug, Clone)]
struct ValidConfig(DeflateConfig);

impl Arbitrary for ValidConfig {
    fn arbitrary(g: &mut Gen) -> Self {
        let levels: Vec<i32> = (0..=9).collect();
        let mem_levels: Vec<i32> = (1..=9).collect();
        let window_bits: Vec<i32> = (-15..=-9).chain(9..=15).collect();
        let strategies = [Strategy::Default, Strategy::Filtered, Strategy::HuffmanOnly];

        ValidConfig(DeflateConfig {
            level: *g.choose(&levels).unwrap(),
            window_bits: *g.choose(&window_bits).unwrap(),
            mem_level: *g.choose(&mem_levels).unwrap(),
            strategy: *g.choose(&strategies).unwrap(),
        })
    }
}

quickcheck::quickcheck! {
    fn qc_round_trip(data: Vec<u8>, config: ValidConfig) -> bool {
        let config = config.0;
        let compressed = deflate_all(&data, config);

        let recovered = if config.window_bits < 0 {
            inflate_raw(&compressed)
        } else {
            inflate(&compressed)
        };

        recovered == data
    }

    fn qc_chunked_feeding_is_byte_identical(data: Vec<u8>, chunk_in: u8, chunk_out: u8, config: ValidConfig) -> TestResult {
        if data.is_empty() {
            return TestResult::discard();
        }

        let config = config.0;
        let single = deflate_all(&data, config);
        let chunked = deflate_chunked(
            &data,
            config,
            chunk_in as usize + 1,
            chunk_out as usize + 1,
            Flush::NoFlush,
        );

        TestResult::from_bool(chunked == single)
    }

    fn qc_sync_flush_points_survive(data: Vec<u8>, split: u16) -> bool {
        let split = split as usize % (data.len() + 1);
        let (a, b) = data.split_at(split);

        let mut stream = DeflateStream::new(DeflateConfig::new(6)).unwrap();
        let mut out = vec![0; compress_bound(data.len()) + 64];
        let mut out_pos = 0;

        let result = stream.deflate(a, &mut out, Flush::SyncFlush);
        assert_eq!(result.return_code, ReturnCode::Ok);
        out_pos += result.bytes_written;

        let result = stream.deflate(b, &mut out[out_pos..], Flush::Finish);
        assert_eq!(result.return_code, ReturnCode::StreamEnd);
        out_pos += result.bytes_written;
        stream.end();

        inflate(&out[..out_pos]) == data
    }
}
