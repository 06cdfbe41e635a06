//! wgpu presentation of camera frames: one RGBA texture, blitted to the whole window.

use std::rc::Rc;

use anyhow::anyhow;
use wgpu::*;

use crate::image::Resolution;

/// A handle to a GPU.
pub struct Gpu {
    instance: Instance,
    adapter: Adapter,
    device: Device,
    queue: Queue,
}

impl Gpu {
    /// Opens a suitable default GPU.
    pub async fn open() -> anyhow::Result<Self> {
        // The OpenGL backend panics spuriously, so don't enable it.
        let backends = Backends::PRIMARY;
        let instance = Instance::new(InstanceDescriptor {
            backends,
            ..Default::default()
        });

        log::info!("available graphics adapters:");
        for adapter in instance.enumerate_adapters(backends) {
            let info = adapter.get_info();
            log_adapter("-", &info);
        }

        let adapter = instance
            .request_adapter(&Default::default())
            .await
            .ok_or_else(|| anyhow!("no graphics adapter found"))?;
        log_adapter("using", &adapter.get_info());

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: None,
                    features: Features::empty(),
                    // Make sure we use the texture resolution limits from the adapter, so we can
                    // support large images.
                    limits: Limits::downlevel_defaults().using_resolution(adapter.limits()),
                },
                None,
            )
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn queue(&self) -> &Queue {
        &self.queue
    }
}

fn log_adapter(prefix: &str, info: &AdapterInfo) {
    log::info!(
        "{} {} ({:?}, {:?})",
        prefix,
        info.name,
        info.device_type,
        info.backend,
    );
}

pub struct Renderer {
    gpu: Rc<Gpu>,
    // Declared before `window`: the surface has to be destroyed first.
    surface: Surface,
    surface_format: TextureFormat,
    pipeline: RenderPipeline,
    layout: BindGroupLayout,
    bind_group: BindGroup,
    frame_tex: wgpu::Texture,
    frame_size: Extent3d,
    window: Rc<winit::window::Window>,
}

impl Renderer {
    pub fn new(window: Rc<winit::window::Window>, gpu: Rc<Gpu>) -> anyhow::Result<Self> {
        let surface = unsafe { gpu.instance.create_surface(&*window)? };
        let surface_format = *surface
            .get_capabilities(&gpu.adapter)
            .formats
            .first()
            .ok_or_else(|| anyhow!("window surface supports no texture formats"))?;

        let device = gpu.device();
        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("frame blit"),
            source: ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("frame"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: false },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: None,
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("frame blit"),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader,
                entry_point: "vert",
                buffers: &[],
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: "frag",
                targets: &[Some(surface_format.into())],
            }),
            primitive: PrimitiveState::default(),
            depth_stencil: None,
            multisample: MultisampleState::default(),
            multiview: None,
        });

        let frame_size = Extent3d::default();
        let frame_tex = frame_texture(device, frame_size);
        let bind_group = bind_frame(device, &layout, &frame_tex);

        let mut this = Self {
            gpu,
            surface,
            surface_format,
            pipeline,
            layout,
            bind_group,
            frame_tex,
            frame_size,
            window,
        };
        this.configure_surface();
        Ok(this)
    }

    /// Uploads new RGBA8 frame data, reallocating the texture when the size changed.
    pub fn update_texture(&mut self, res: Resolution, data: &[u8]) {
        assert_eq!(res.num_pixels() * 4, data.len() as u64);

        let size = Extent3d {
            width: res.width(),
            height: res.height(),
            depth_or_array_layers: 1,
        };
        if self.frame_size != size {
            log::trace!("reallocating {}x{} frame texture", size.width, size.height);
            self.frame_tex = frame_texture(self.gpu.device(), size);
            self.frame_size = size;
            self.bind_group = bind_frame(self.gpu.device(), &self.layout, &self.frame_tex);
        }

        self.gpu.queue().write_texture(
            ImageCopyTexture {
                texture: &self.frame_tex,
                mip_level: 0,
                origin: Origin3d::ZERO,
                aspect: TextureAspect::All,
            },
            data,
            ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size.width * 4),
                rows_per_image: None,
            },
            size,
        );
    }

    pub fn redraw(&mut self) {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(err @ (SurfaceError::Lost | SurfaceError::Outdated)) => {
                log::debug!("reconfiguring surface: {err}");
                self.configure_surface();
                self.surface
                    .get_current_texture()
                    .expect("surface unusable after reconfiguration")
            }
            Err(err) => panic!("failed to acquire frame: {err}"),
        };

        let target = frame.texture.create_view(&TextureViewDescriptor::default());
        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&CommandEncoderDescriptor::default());
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &target,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(Color::BLACK),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            // The vertex shader spans the window with a single oversized triangle.
            pass.draw(0..3, 0..1);
        }

        self.gpu.queue().submit([encoder.finish()]);
        frame.present();
    }

    pub fn window(&self) -> &winit::window::Window {
        &self.window
    }

    fn configure_surface(&mut self) {
        let size = self.window.inner_size();
        log::debug!(
            "configuring {}x{} window surface (format: {:?})",
            size.width,
            size.height,
            self.surface_format,
        );
        self.surface.configure(
            self.gpu.device(),
            &SurfaceConfiguration {
                usage: TextureUsages::RENDER_ATTACHMENT,
                format: self.surface_format,
                width: size.width,
                height: size.height,
                present_mode: PresentMode::Fifo,
                alpha_mode: CompositeAlphaMode::Auto,
                view_formats: Vec::new(),
            },
        );
    }
}

fn frame_texture(device: &Device, size: Extent3d) -> wgpu::Texture {
    device.create_texture(&TextureDescriptor {
        label: Some("camera frame"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: TextureFormat::Rgba8UnormSrgb,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn bind_frame(device: &Device, layout: &BindGroupLayout, texture: &wgpu::Texture) -> BindGroup {
    let sampler = device.create_sampler(&SamplerDescriptor::default());
    device.create_bind_group(&BindGroupDescriptor {
        label: Some("frame"),
        layout,
        entries: &[
            BindGroupEntry {
                binding: 0,
                resource: BindingResource::TextureView(
                    &texture.create_view(&Default::default()),
                ),
            },
            BindGroupEntry {
                binding: 1,
                resource: BindingResource::Sampler(&sampler),
            },
        ],
    })
}
