// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Integration tests for the COMPACT extractor and decoder using the
//! checked-in telegram dump and its reference manifest.

use edgefirst_scansegment::{
    compact::parse_segment,
    framing::{CompactExtractorState, CompactStreamExtractor, TelegramExtractor},
    segment::Error,
};

/// Path to the COMPACT sample telegram dump
const SAMPLE: &str = "testdata/sample.compact";

/// Path to the fixture reference values
const MANIFEST: &str = "testdata/manifest.json";

#[derive(serde::Deserialize)]
struct Manifest {
    compact: CompactExpectations,
}

#[derive(serde::Deserialize)]
struct CompactExpectations {
    telegram_counter: u64,
    timestamp_transmit: u64,
    command_id: u32,
    version: u32,
    modules: usize,
    segment_counter: u32,
    frame_number: u32,
    sender_id: u32,
    lines_in_module: u32,
    beams_per_scan: u32,
    echos_per_beam: u32,
    distance_scaling_factor: f32,
    distance_mm: Vec<f32>,
    rssi: Vec<u16>,
    theta_start_deg: Vec<f32>,
    theta_stop_deg: Vec<f32>,
    channel_theta_first_deg: Vec<f32>,
}

fn load_sample() -> Vec<u8> {
    std::fs::read(SAMPLE).expect("testdata/sample.compact missing")
}

fn load_manifest() -> CompactExpectations {
    let manifest: Manifest =
        serde_json::from_str(&std::fs::read_to_string(MANIFEST).expect("manifest missing"))
            .expect("manifest invalid");
    manifest.compact
}

#[test]
fn test_extractor_emits_sample_telegram() {
    let data = load_sample();
    let mut extractor = CompactStreamExtractor::new();
    let telegrams = extractor.feed(&data);
    assert_eq!(telegrams, vec![data]);
    assert!(extractor.is_idle());
}

#[test]
fn test_sample_decodes_to_manifest_values() {
    let expected = load_manifest();
    let segment = parse_segment(&load_sample()).unwrap();

    assert_eq!(segment.telegram_counter, expected.telegram_counter);
    assert_eq!(segment.timestamp_transmit, expected.timestamp_transmit);
    assert_eq!(segment.command_id, expected.command_id);
    assert_eq!(segment.version, expected.version);
    assert_eq!(segment.modules.len(), expected.modules);

    for (index, module) in segment.modules.iter().enumerate() {
        assert_eq!(module.segment_counter, expected.segment_counter);
        assert_eq!(module.frame_number, expected.frame_number);
        assert_eq!(module.sender_id, expected.sender_id);
        assert_eq!(module.lines_in_module, expected.lines_in_module);
        assert_eq!(module.beams_per_scan, expected.beams_per_scan);
        assert_eq!(module.echos_per_beam, expected.echos_per_beam);
        assert_eq!(module.distance_scaling_factor, expected.distance_scaling_factor);
        assert!(
            (module.theta_start[0] - expected.theta_start_deg[index].to_radians()).abs() < 1e-6
        );
        assert!((module.theta_stop[0] - expected.theta_stop_deg[index].to_radians()).abs() < 1e-6);

        assert_eq!(module.segment_data.len(), 1);
        let line = &module.segment_data[0];
        assert_eq!(line.distance.len(), expected.echos_per_beam as usize);
        for echo in &line.distance {
            assert_eq!(
                echo,
                &vec![expected.distance_mm[index]; expected.beams_per_scan as usize]
            );
        }
        for echo in &line.rssi {
            assert_eq!(
                echo,
                &vec![expected.rssi[index]; expected.beams_per_scan as usize]
            );
        }

        // Azimuths are binary16 on the wire, so compare with half-float
        // precision
        assert_eq!(line.channel_theta.len(), expected.beams_per_scan as usize);
        for (beam, theta) in line.channel_theta.iter().enumerate() {
            let reference = (expected.channel_theta_first_deg[index] + beam as f32).to_radians();
            assert!(
                (theta - reference).abs() < 1e-3,
                "module {} beam {}: {} vs {}",
                index,
                beam,
                theta,
                reference
            );
        }
        assert!(line.properties.is_empty());
    }
}

#[test]
fn test_corrupt_crc_is_rejected() {
    let mut data = load_sample();
    let len = data.len();
    data[len - 4..].fill(0);
    assert!(matches!(parse_segment(&data), Err(Error::CrcMismatch { .. })));
}

#[test]
fn test_flipping_any_covered_byte_is_detected() {
    let data = load_sample();
    for offset in 0..data.len() - 4 {
        let mut corrupted = data.clone();
        corrupted[offset] ^= 0x01;
        assert!(
            parse_segment(&corrupted).is_err(),
            "flip at byte {} went undetected",
            offset
        );
    }
}

#[test]
fn test_noise_before_magic_is_discarded() {
    let data = load_sample();
    let mut stream: Vec<u8> = (0x30u8..0x41).collect(); // 17 noise bytes
    stream.extend_from_slice(&data);

    let mut extractor = CompactStreamExtractor::new();
    assert_eq!(extractor.feed(&stream), vec![data]);
}

#[test]
fn test_two_back_to_back_telegrams() {
    let data = load_sample();
    let mut stream = data.clone();
    stream.extend_from_slice(&data);

    let mut extractor = CompactStreamExtractor::new();
    let telegrams = extractor.feed(&stream);
    assert_eq!(telegrams.len(), 2);
    assert_eq!(telegrams[0], data);
    assert_eq!(telegrams[1], data);

    let first = parse_segment(&telegrams[0]).unwrap();
    let second = parse_segment(&telegrams[1]).unwrap();
    assert_eq!(
        first.modules[0].frame_number,
        second.modules[0].frame_number
    );
}

#[test]
fn test_truncation_never_emits() {
    let data = load_sample();
    for len in 0..data.len() {
        let mut extractor = CompactStreamExtractor::new();
        assert!(
            extractor.feed(&data[..len]).is_empty(),
            "telegram emitted from {} byte prefix",
            len
        );
        if len >= 4 {
            assert_ne!(
                extractor.state(),
                CompactExtractorState::SearchStart,
                "len {}",
                len
            );
        }
    }
}

#[test]
fn test_byte_at_a_time_equals_one_chunk() {
    let data = load_sample();

    let mut extractor = CompactStreamExtractor::new();
    let mut collected = Vec::new();
    for byte in &data {
        collected.extend(extractor.feed(std::slice::from_ref(byte)));
    }
    assert_eq!(collected, vec![data]);
}
