use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use redlilium_gpu::{
    BufferDescriptor, BufferUsage, DeviceParameters, DriverKind, GpuDevice, PipelineDescriptor,
    SamplerDescriptor, ShaderDescriptor, ShaderStage, StateCache,
};

fn dummy_device() -> Arc<GpuDevice> {
    GpuDevice::new(DeviceParameters::new().with_driver(DriverKind::Dummy))
        .expect("dummy device")
}

// ---------------------------------------------------------------------------
// Command pool
// ---------------------------------------------------------------------------

fn bench_acquire_abandon(c: &mut Criterion) {
    let device = dummy_device();
    c.bench_function("command_buffer_acquire_abandon", |b| {
        b.iter(|| {
            let cmd = device.acquire_command_buffer(None).unwrap();
            device.abandon_command_buffer(black_box(cmd)).unwrap();
        });
    });
}

fn bench_submit_recycle(c: &mut Criterion) {
    let device = dummy_device();
    let fence = device.create_fence().unwrap();
    c.bench_function("command_buffer_submit_recycle", |b| {
        b.iter(|| {
            let mut cmd = device.acquire_command_buffer(None).unwrap();
            device.submit(&mut cmd, Some(&fence)).unwrap();
            device.wait_fence(&fence).unwrap();
            device.reset_fence(&fence).unwrap();
            device.recycle_command_buffer(cmd).unwrap();
        });
    });
}

fn bench_pool_growth(c: &mut Criterion) {
    c.bench_function("command_pool_grow_to_64", |b| {
        b.iter_with_setup(dummy_device, |device| {
            let buffers: Vec<_> = (0..64)
                .map(|_| device.acquire_command_buffer(None).unwrap())
                .collect();
            black_box(device.pool_stats());
            drop(buffers);
        });
    });
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

fn bench_record_copies(c: &mut Criterion) {
    let device = dummy_device();
    let staging = device.create_cpu_buffer(Some("staging"), 4096, None).unwrap();
    let buffer = device
        .create_buffer(&BufferDescriptor::new(4096).with_usage(BufferUsage::STORAGE))
        .unwrap();
    c.bench_function("record_32_copies", |b| {
        b.iter(|| {
            let mut cmd = device.acquire_command_buffer(None).unwrap();
            cmd.begin_blit_pass().unwrap();
            for i in 0..32 {
                cmd.copy_cpu_to_gpu(&staging, i * 128, &buffer, i * 128, 128)
                    .unwrap();
            }
            cmd.end_blit_pass().unwrap();
            device.abandon_command_buffer(cmd).unwrap();
        });
    });
}

// ---------------------------------------------------------------------------
// State cache
// ---------------------------------------------------------------------------

fn bench_state_cache_hit(c: &mut Criterion) {
    let device = dummy_device();
    let cache = StateCache::new(Arc::clone(&device));
    let vs = device
        .create_shader(&ShaderDescriptor::new(ShaderStage::Vertex, vec![0; 4]))
        .unwrap();
    let fs = device
        .create_shader(&ShaderDescriptor::new(ShaderStage::Fragment, vec![0; 4]))
        .unwrap();
    let pipeline = PipelineDescriptor::new(vs, fs);
    let sampler = SamplerDescriptor::linear();
    cache.pipeline(&pipeline).unwrap();
    cache.sampler(&sampler).unwrap();

    c.bench_function("state_cache_pipeline_hit", |b| {
        b.iter(|| black_box(cache.pipeline(&pipeline).unwrap()));
    });
    c.bench_function("state_cache_sampler_hit", |b| {
        b.iter(|| black_box(cache.sampler(&sampler).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_acquire_abandon,
    bench_submit_recycle,
    bench_pool_growth,
    bench_record_copies,
    bench_state_cache_hit,
);
criterion_main!(benches);
