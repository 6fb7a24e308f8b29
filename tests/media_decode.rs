use rodio::{Decoder, Source};
use std::f32::consts::PI;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use sonosphere::audio::{MediaElement, OfflineAnalyzer};
use sonosphere::AudioSourceOptions;

fn write_tone(name: &str, frequency: f32, sample_rate: u32, seconds: f32) -> PathBuf {
    let path = std::env::temp_dir().join(format!("sonosphere-{}-{}.wav", name, std::process::id()));
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    let frames = (sample_rate as f32 * seconds) as usize;
    for i in 0..frames {
        let s = (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin() * 0.4;
        let value = (s * i16::MAX as f32) as i16;
        writer.write_sample(value).unwrap();
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
    path
}

#[test]
fn element_reports_decoded_format() {
    let path = write_tone("format", 330.0, 22050, 0.25);
    let element = MediaElement::open(&path).unwrap();
    assert_eq!(element.sample_rate(), 22050);
    assert_eq!(element.channels(), 2);
    assert!(!element.has_source());
    let _ = std::fs::remove_file(&path);
}

#[test]
fn decoded_tone_is_named_correctly() {
    let path = write_tone("pitch", 220.0, 44100, 1.0);
    let decoder = Decoder::new(BufReader::new(File::open(&path).unwrap())).unwrap();
    let (rate, channels) = (decoder.sample_rate(), decoder.channels());

    let options = AudioSourceOptions::default();
    let mut analyzer = OfflineAnalyzer::new(rate, channels, &options, 60.0);
    let mut notes = Vec::new();
    let frames = analyzer.run(decoder.convert_samples::<f32>(), |_, snapshot| {
        notes.push(snapshot.note_label());
    });
    let _ = std::fs::remove_file(&path);

    assert_eq!(frames, 60);
    // Once the analyser window is full every frame sees the same steady tone.
    let settled = &notes[10..];
    assert!(settled.iter().all(|n| n.as_deref() == Some("A3")), "{:?}", settled);
}
