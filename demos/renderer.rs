use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, StreamConfig};

use anyhow::{bail, Context, Error};
use hound::WavReader;

use ambinaural::filters::MemoryStore;
use ambinaural::{AmbisonicFrame, AmbisonicOrder, Renderer, RotationHandle};
use glam::Quat;

use ringbuf::{traits::*, HeapRb};

use std::sync::{Arc, Condvar, Mutex};
use std::{env, io::Read};
use std::{thread, time};

// Rotation in radians to apply to the scene every 50 ms
const ROTATION: f32 = 2.0 / 180.0 * std::f32::consts::PI;
// Single block size in frames
const BLOCK_LEN: usize = 1024;

fn main() -> Result<(), Error> {
    let args: Vec<String> = env::args().collect();

    if args.len() != 3 {
        bail!("Usage: {} AMBISONIC_WAV_FILE FILTER_DIR", args[0].clone());
    }

    let wav = &args[1];
    let filters = &args[2];

    let reader = WavReader::open(wav).context("Open wav file failed")?;
    let spec = reader.spec();

    if spec.sample_format != hound::SampleFormat::Float {
        bail!("Unsupported format, must be F32");
    }

    // (N + 1)² channels
    let order = (1..=7)
        .find(|n| (n + 1) * (n + 1) == spec.channels as usize)
        .context("Channel count is not a full ambisonic order")?;

    println!("Wave file spec: {:?}, order {order}", spec);

    let store = MemoryStore::from_dir(filters).context("Read filter dir failed")?;

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("No output device available")?;

    let config = device.default_output_config()?;
    println!("Default output config: {:?}", config);

    let mut stream_config = StreamConfig::from(config.clone());
    stream_config.channels = 2;
    stream_config.buffer_size = BufferSize::Fixed(BLOCK_LEN as u32);

    let (renderer, handle) = Renderer::builder(order)
        .with_sample_rate(spec.sample_rate as f32)
        .with_partition_len(64)
        .build(&store)
        .context("Build renderer failed")?;

    match config.sample_format() {
        cpal::SampleFormat::F32 => run(&device, &stream_config, renderer, handle, reader),
        fmt => bail!("Unsupported sample format {:?}", fmt),
    }
}

pub fn run<R>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut renderer: Renderer,
    mut handle: RotationHandle,
    mut reader: WavReader<R>,
) -> Result<(), Error>
where
    R: Read + Send + 'static,
{
    let order: AmbisonicOrder = renderer.order();
    let channels = order.num_channels();

    let mut frame = AmbisonicFrame::new(order, BLOCK_LEN);
    let mut left = vec![0.0; BLOCK_LEN];
    let mut right = vec![0.0; BLOCK_LEN];

    let eos = Arc::new((Mutex::new(false), Condvar::new()));
    let eos_clone = Arc::clone(&eos);

    let ringbuf = HeapRb::new(BLOCK_LEN * 4);
    let (mut producer, mut consumer) = ringbuf.split();

    for _ in 0..BLOCK_LEN {
        producer.try_push(0.0).unwrap();
    }

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let left_samples = reader.samples::<f32>().len();
            let data_samples = data.len();

            if left_samples < BLOCK_LEN * channels {
                let (lock, cvar) = &*eos_clone;
                let mut eos = lock.lock().unwrap();

                *eos = true;
                cvar.notify_one();

                return;
            }

            while data_samples >= consumer.occupied_len() {
                let src = reader
                    .samples::<f32>()
                    .take(BLOCK_LEN * channels)
                    .collect::<Result<Vec<_>, _>>()
                    .unwrap();

                frame.copy_from_interleaved(&src);

                renderer
                    .process(&mut frame, &mut left, &mut right)
                    .unwrap();

                for (l, r) in Iterator::zip(left.iter(), right.iter()) {
                    producer.try_push(*l).unwrap();
                    producer.try_push(*r).unwrap();
                }
            }

            for dst in data.chunks_exact_mut(2) {
                dst[0] = consumer.try_pop().unwrap();
                dst[1] = consumer.try_pop().unwrap();
            }
        },
        |err| eprintln!("An error occurred on stream: {}", err),
        None,
    )?;

    stream.play()?;

    thread::spawn(move || {
        let mut yaw = 0.0f32;

        loop {
            yaw += ROTATION;
            println!("Yaw: {:.1}°", yaw.to_degrees() % 360.0);

            if !handle.set_rotation(Quat::from_rotation_y(yaw)) {
                eprintln!("Rotation queue full, update dropped");
            }

            thread::sleep(time::Duration::from_millis(50));
        }
    });

    let (lock, cvar) = &*eos;
    let mut eos = lock.lock().unwrap();

    while !(*eos) {
        eos = cvar.wait(eos).unwrap();
    }

    Ok(())
}
