//! Decode scenarios across a two-level decoder stack

use decode_stack::{
    AnnotationClass, AnnotationRowSpec, ChannelSpec, DecodeEvent, DecodeStack, DecodeState,
    Decoder, DecoderDescriptor, DecoderInstance, DecoderOptions, DecoderOutput, LogicChunk,
    LogicData, LogicSnapshot, MIN_SPAN_DEFAULT, ProtocolData, Row, SampleSnapshot, SignalSource,
    StaticSignalSource,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const SAMPLES: usize = 1000;
const PULSES: u64 = 50;

/// Measures high pulses on `in`; pulses narrower than `min_width` also get a warning
struct Pulse;

struct PulseInstance {
    min_width: u64,
    level: Option<bool>,
    rise: u64,
}

impl DecoderDescriptor for Pulse {
    fn id(&self) -> &str {
        "pulse"
    }

    fn name(&self) -> &str {
        "Pulse"
    }

    fn channels(&self) -> Vec<ChannelSpec> {
        vec![ChannelSpec::new("in", "IN")]
    }

    fn optional_channels(&self) -> Vec<ChannelSpec> {
        vec![ChannelSpec::new("gate", "GATE")]
    }

    fn annotation_classes(&self) -> Vec<AnnotationClass> {
        vec![
            AnnotationClass::new("edge", "Rising edge"),
            AnnotationClass::new("pulse", "Pulse width"),
            AnnotationClass::new("narrow", "Narrow pulse"),
        ]
    }

    fn annotation_rows(&self) -> Vec<AnnotationRowSpec> {
        vec![
            AnnotationRowSpec::new("bits", "Bits", vec![0]),
            AnnotationRowSpec::new("pulses", "Pulses", vec![1]),
            AnnotationRowSpec::new("warnings", "Warnings", vec![2]),
        ]
    }

    fn create_instance(&self, options: &DecoderOptions) -> Result<Box<dyn DecoderInstance>, String> {
        let min_width = match options.get("min_width") {
            Some(v) => v.parse().map_err(|_| format!("bad min_width: {}", v))?,
            None => 0,
        };
        Ok(Box::new(PulseInstance {
            min_width,
            level: None,
            rise: 0,
        }))
    }
}

impl DecoderInstance for PulseInstance {
    fn decode(&mut self, chunk: &LogicChunk<'_>, out: &mut DecoderOutput) -> Result<(), String> {
        if self.level.is_none() {
            self.level = chunk.initial(0);
        }
        for pos in chunk.start()..chunk.end() {
            let level = chunk.sample(0, pos).ok_or("missing sample")?;
            let gated = chunk.is_bound(1) && chunk.sample(1, pos) == Some(false);
            match (self.level, level) {
                (Some(false), true) => {
                    self.rise = pos;
                    out.annotate(pos, pos, 0, vec!["Rise".into(), "R".into()]);
                }
                (Some(true), false) if !gated => {
                    let width = pos - self.rise;
                    out.annotate(self.rise, pos, 1, vec![format!("Width {}", width), width.to_string()]);
                    if width < self.min_width {
                        out.annotate(self.rise, pos, 2, vec!["Narrow".into()]);
                    }
                    out.forward(ProtocolData::new(self.rise, pos, width));
                }
                _ => {}
            }
            self.level = Some(level);
        }
        Ok(())
    }
}

/// Numbers the pulses forwarded by the decoder above
struct Count;

#[derive(Default)]
struct CountInstance {
    seen: u64,
}

impl DecoderDescriptor for Count {
    fn id(&self) -> &str {
        "count"
    }

    fn name(&self) -> &str {
        "Count"
    }

    fn create_instance(&self, _: &DecoderOptions) -> Result<Box<dyn DecoderInstance>, String> {
        Ok(Box::new(CountInstance::default()))
    }
}

impl DecoderInstance for CountInstance {
    fn decode_stacked(&mut self, data: &ProtocolData, out: &mut DecoderOutput) -> Result<(), String> {
        data.get::<u64>().ok_or("expected a pulse width")?;
        self.seen += 1;
        out.annotate(data.start_sample, data.end_sample, 0, vec![format!("#{}", self.seen)]);
        Ok(())
    }
}

/// Pulse `k` starts at `20k + 4`; every tenth pulse is 2 samples wide, the rest 5
fn pulse_train() -> Vec<bool> {
    let mut bits = vec![false; SAMPLES];
    for k in 0..PULSES as usize {
        let start = 20 * k + 4;
        let width = if k % 10 == 9 { 2 } else { 5 };
        bits[start..start + width].fill(true);
    }
    bits
}

fn source() -> Arc<dyn SignalSource> {
    let snapshot: Arc<dyn SampleSnapshot> =
        Arc::new(LogicSnapshot::with_block_size(SAMPLES as u64, 128).with_channel(0, pulse_train()));
    Arc::new(StaticSignalSource::new(LogicData::new(snapshot, 24_000_000), 4))
}

fn pulse_stack(chunk: u64) -> DecodeStack {
    let mut stack = DecodeStack::new(source()).with_max_chunk_size(chunk);
    stack.push(
        Decoder::new(Arc::new(Pulse))
            .with_channel("in", 0)
            .with_option("min_width", "3"),
    );
    stack.push(Decoder::new(Arc::new(Count)));
    stack
}

#[test]
fn test_stacked_rows_are_filled() {
    let stack = pulse_stack(37);
    stack.begin_decode();
    stack.wait_decode();
    assert_eq!(stack.error_message(), "");
    assert_eq!(stack.decode_state(), DecodeState::Stopped);

    let rows = stack.rows();
    let titles: Vec<_> = rows.iter().map(|r| r.title()).collect();
    assert_eq!(
        titles,
        vec!["Count", "Pulse: Bits", "Pulse: Pulses", "Pulse: Warnings"]
    );
    let (count, bits, pulses, warnings) = (&rows[0], &rows[1], &rows[2], &rows[3]);

    let all = |row: &Row| stack.get_annotation_subset(row, 0, SAMPLES as u64);
    assert_eq!(all(pulses).len() as u64, PULSES);
    assert_eq!(all(bits).len() as u64, PULSES);
    assert_eq!(all(warnings).len(), 5);
    assert_eq!(all(count).len() as u64, PULSES);

    assert_eq!(stack.get_max_annotation(pulses), 5);
    assert_eq!(stack.get_min_annotation(pulses), 2);
    assert_eq!(stack.get_max_annotation(bits), 0);
    assert_eq!(stack.get_min_annotation(bits), MIN_SPAN_DEFAULT);

    let last = all(count).pop().map(|a| a.texts()[0].clone());
    assert_eq!(last.as_deref(), Some("#50"));
    assert_eq!(stack.max_sample_count(), 986);
}

#[test]
fn test_results_do_not_depend_on_chunk_size() {
    let collect = |chunk| {
        let stack = pulse_stack(chunk);
        stack.begin_decode();
        stack.wait_decode();
        let mut annotations = Vec::new();
        for row in stack.rows() {
            annotations.extend(stack.get_annotation_subset(&row, 0, SAMPLES as u64));
        }
        annotations
    };

    let reference = collect(4096);
    for chunk in [1, 7, 64, 200] {
        assert_eq!(collect(chunk), reference, "chunk size {}", chunk);
    }
}

#[test]
fn test_list_view_hides_bits_and_warnings() {
    let stack = pulse_stack(4096);
    stack.begin_decode();
    stack.wait_decode();

    assert_eq!(stack.list_rows_size(), 2);
    assert_eq!(stack.list_row_title(0).as_deref(), Some("Count"));
    assert_eq!(stack.list_row_title(1).as_deref(), Some("Pulse: Pulses"));
    assert_eq!(stack.list_row_title(2), None);
    assert_eq!(stack.list_annotation_size(), PULSES);
    assert_eq!(stack.list_annotation_size_of(1), PULSES);

    let first = stack.list_annotation(1, 0).map(|a| (a.start_sample(), a.end_sample()));
    assert_eq!(first, Some((4, 9)));

    let warnings = stack.rows()[3].clone();
    stack.set_rows_lshow(&warnings, true);
    assert_eq!(stack.list_rows_size(), 3);
    assert_eq!(stack.list_annotation_size_of(2), 5);
}

#[test]
fn test_annotation_index_and_subset() {
    let stack = pulse_stack(100);
    stack.begin_decode();
    stack.wait_decode();
    let pulses = stack.rows()[2].clone();

    // Pulses 10 and 11 cover [204, 209) and [224, 229)
    let window = stack.get_annotation_subset(&pulses, 204, 224);
    let starts: Vec<_> = window.iter().map(|a| a.start_sample()).collect();
    assert_eq!(starts, vec![204, 224]);
    assert_eq!(stack.get_annotation_index(&pulses, 204), 11);
    assert_eq!(stack.get_annotation_index(&pulses, 203), 10);
    assert!(stack.has_annotations(&pulses));
}

#[test]
fn test_bad_option_fails_instantiation() {
    let mut stack = DecodeStack::new(source());
    stack.push(
        Decoder::new(Arc::new(Pulse))
            .with_channel("in", 0)
            .with_option("min_width", "wide"),
    );
    stack.begin_decode();
    stack.wait_decode();
    assert_eq!(stack.error_message(), "Failed to create decoder instance");
    assert!(stack.rows().iter().all(|row| !stack.has_annotations(row)));
}

#[test]
fn test_readers_poll_while_decoding() {
    let stack = Arc::new(pulse_stack(3));
    let events = stack.subscribe();
    stack.begin_decode();

    let reader = {
        let stack = Arc::clone(&stack);
        thread::spawn(move || {
            let pulses = stack.rows()[2].clone();
            let mut last = 0;
            loop {
                let len = stack.get_annotation_subset(&pulses, 0, SAMPLES as u64).len();
                assert!(len >= last);
                last = len;
                if stack.decode_state() == DecodeState::Stopped {
                    break;
                }
                thread::yield_now();
            }
        })
    };

    loop {
        match events.recv_timeout(Duration::from_secs(10)) {
            Ok(DecodeEvent::Done) => break,
            Ok(DecodeEvent::Progress { .. }) => {}
            Err(e) => panic!("decode did not finish: {}", e),
        }
    }
    reader.join().unwrap();
    stack.wait_decode();
    assert_eq!(stack.list_annotation_size(), PULSES);
}

#[test]
fn test_stacks_decode_concurrently() {
    let stacks: Vec<_> = (0..3).map(|_| pulse_stack(50)).collect();
    for stack in &stacks {
        stack.begin_decode();
    }
    for stack in &stacks {
        stack.wait_decode();
        assert_eq!(stack.samples_decoded(), SAMPLES as u64);
        assert_eq!(stack.list_annotation_size(), PULSES);
    }
}

#[test]
fn test_removing_top_decoder_keeps_flags_of_remaining_rows() {
    let mut stack = pulse_stack(4096);
    let count_row = stack.rows()[0].clone();
    stack.set_rows_gshow(&count_row, false);

    let removed = stack.remove(0);
    assert_eq!(removed.map(|d| d.name().to_string()).as_deref(), Some("Pulse"));
    assert_eq!(stack.rows(), vec![count_row.clone()]);
    assert_eq!(stack.get_rows_gshow().get(&count_row), Some(&false));

    // The remaining decoder consumes no channels, so there is nothing to feed
    stack.begin_decode();
    stack.wait_decode();
    assert_eq!(stack.samples_decoded(), 0);
    assert!(!stack.options_changed());
}
