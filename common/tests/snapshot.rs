use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use common::{
    sample::SensorSample,
    snapshot,
    types::units::{Afr, Celsius, Dps, GForce, Mph},
};
use rand::Rng;

/// Every field is derived from one counter so a torn read is detectable
fn sample_for(counter: u32) -> SensorSample {
    let value = counter as f32;

    let mut sample = SensorSample::default();
    sample.position.lat_e7 = counter as i32;
    sample.position.lon_e7 = -(counter as i32);
    sample.position.speed = Mph(value);
    sample.position.satellites = (counter % 251) as u8;
    sample.inertial.accel_x = GForce(value);
    sample.inertial.gyro_z = Dps(value * 2.0);
    sample.inertial.temperature = Celsius(value + 1.0);
    sample.engine.afr_bank1 = Afr(value);
    sample.engine.afr_bank2 = Afr(value + 0.5);
    sample.status.keyframe = Some(counter);

    sample
}

fn counter_of(sample: &SensorSample) -> u32 {
    let counter = sample.position.lat_e7 as u32;

    assert_eq!(*sample, sample_for(counter), "Torn read at {counter}");

    counter
}

#[test]
fn readers_never_see_torn_samples() {
    const PUBLISHES: u32 = 20_000;

    let (mut publisher, reader) = snapshot::channel(sample_for(0));
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let reader = reader.clone();
            let done = done.clone();

            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                let mut last = 0;
                let mut reads = 0u64;

                while !done.load(Ordering::Relaxed) {
                    let counter = counter_of(&reader.read());
                    assert!(counter >= last, "Went back in time {last} -> {counter}");
                    last = counter;
                    reads += 1;

                    if rng.gen_bool(0.01) {
                        thread::sleep(Duration::from_micros(rng.gen_range(0..50)));
                    }
                }

                reads
            })
        })
        .collect();

    let mut rng = rand::thread_rng();
    for counter in 1..=PUBLISHES {
        publisher.publish(&sample_for(counter));

        if rng.gen_bool(0.001) {
            thread::sleep(Duration::from_micros(rng.gen_range(0..100)));
        } else if rng.gen_bool(0.05) {
            thread::yield_now();
        }
    }

    done.store(true, Ordering::Relaxed);

    for reader in readers {
        let reads = reader.join().expect("Reader panicked");
        assert!(reads > 0);
    }

    assert_eq!(counter_of(&reader.read()), PUBLISHES);
    assert_eq!(reader.generation(), PUBLISHES as u64);
}

#[test]
fn generation_tracks_publishes_across_threads() {
    let (mut publisher, reader) = snapshot::channel(0u64);

    let writer = thread::spawn(move || {
        for value in 1..=1000u64 {
            publisher.publish(&value);
        }
    });

    let mut last = 0;
    while last < 1000 {
        let generation = reader.generation();
        assert!(generation >= last);
        last = generation;
        thread::yield_now();
    }

    writer.join().expect("Writer panicked");
    assert_eq!(reader.read(), 1000);
}
