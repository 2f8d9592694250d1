use brimstone_world::VoxelWorld;

/// Device-side snapshots of the host tables: handle grid, TraceBrick
/// directory, packed payload arena, palette arena, material records,
/// and the seen-feedback mask.
///
/// All buffers are created up front from the world's current sizes and
/// recreated (with bind-group invalidation signalled to the caller)
/// only when an arena outgrows its buffer.
pub struct GpuTables {
    pub handles: wgpu::Buffer,
    pub trace_bricks: wgpu::Buffer,
    pub payload: wgpu::Buffer,
    pub palettes: wgpu::Buffer,
    pub materials: wgpu::Buffer,
    pub seen: wgpu::Buffer,
    seen_staging: wgpu::Buffer,
    seen_words: usize,
}

/// Storage buffers cannot be zero-sized; empty tables still get one
/// word so bind groups stay valid before first ingest.
fn table_size(len_bytes: usize) -> u64 {
    len_bytes.max(4) as u64
}

fn create_storage(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

impl GpuTables {
    pub fn new(device: &wgpu::Device, world: &VoxelWorld) -> Self {
        let seen_words = world.grid().seen_words();
        let handles_size = table_size(world.grid().handles().len() * 4);
        log::info!(
            "gpu tables: {} handle bytes, {} trace bricks, {} payload words",
            handles_size,
            world.storage().trace_bricks().len(),
            world.storage().arena().len(),
        );
        Self {
            handles: create_storage(device, "brickmap-handles", handles_size),
            trace_bricks: create_storage(
                device,
                "trace-bricks",
                table_size(std::mem::size_of_val(world.storage().trace_bricks())),
            ),
            payload: create_storage(
                device,
                "brick-payload-arena",
                table_size(world.storage().arena().len() * 4),
            ),
            palettes: create_storage(
                device,
                "palette-arena",
                table_size(world.palettes().as_slice().len() * 4),
            ),
            materials: create_storage(
                device,
                "material-table",
                table_size(std::mem::size_of_val(world.materials().as_slice())),
            ),
            seen: create_storage(device, "seen-mask", table_size(seen_words * 4)),
            seen_staging: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("seen-mask-staging"),
                size: table_size(seen_words * 4),
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            seen_words,
        }
    }

    /// Write the current host tables into the device buffers. Returns
    /// true when any buffer was recreated, in which case the caller
    /// must rebuild bind groups referencing these tables.
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        world: &VoxelWorld,
    ) -> bool {
        let mut recreated = false;
        let mut ensure = |buffer: &mut wgpu::Buffer, label: &str, bytes: usize| {
            if table_size(bytes) > buffer.size() {
                log::debug!("{label} buffer grew to {} bytes", table_size(bytes));
                *buffer = create_storage(device, label, table_size(bytes));
                recreated = true;
            }
        };
        ensure(
            &mut self.handles,
            "brickmap-handles",
            world.grid().handles().len() * 4,
        );
        ensure(
            &mut self.trace_bricks,
            "trace-bricks",
            std::mem::size_of_val(world.storage().trace_bricks()),
        );
        ensure(
            &mut self.payload,
            "brick-payload-arena",
            world.storage().arena().len() * 4,
        );
        ensure(
            &mut self.palettes,
            "palette-arena",
            world.palettes().as_slice().len() * 4,
        );
        ensure(
            &mut self.materials,
            "material-table",
            std::mem::size_of_val(world.materials().as_slice()),
        );

        queue.write_buffer(
            &self.handles,
            0,
            bytemuck::cast_slice(world.grid().handles()),
        );
        if !world.storage().trace_bricks().is_empty() {
            queue.write_buffer(
                &self.trace_bricks,
                0,
                bytemuck::cast_slice(world.storage().trace_bricks()),
            );
        }
        if !world.storage().arena().is_empty() {
            queue.write_buffer(&self.payload, 0, bytemuck::cast_slice(world.storage().arena()));
        }
        if !world.palettes().is_empty() {
            queue.write_buffer(
                &self.palettes,
                0,
                bytemuck::cast_slice(world.palettes().as_slice()),
            );
        }
        queue.write_buffer(
            &self.materials,
            0,
            bytemuck::cast_slice(world.materials().as_slice()),
        );
        recreated
    }

    /// Copy the seen mask into the staging buffer and clear it for the
    /// next frame's feedback.
    pub fn encode_seen_readback(&self, encoder: &mut wgpu::CommandEncoder) {
        let size = (self.seen_words * 4).max(4) as u64;
        encoder.copy_buffer_to_buffer(&self.seen, 0, &self.seen_staging, 0, size);
        encoder.clear_buffer(&self.seen, 0, None);
    }

    /// Non-blocking poll of the last seen-mask readback. Returns the
    /// raw mask words once the map completes.
    pub fn poll_seen(&self, device: &wgpu::Device) -> Option<Vec<u32>> {
        let slice = self.seen_staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Poll);
        match rx.try_recv() {
            Ok(Ok(())) => {
                let data = slice.get_mapped_range();
                let words: Vec<u32> = bytemuck::cast_slice(&data).to_vec();
                drop(data);
                self.seen_staging.unmap();
                Some(words)
            }
            _ => None,
        }
    }
}
