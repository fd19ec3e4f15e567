//! Vulkan implementation of [`RenderBackend`]
//!
//! The renderer is single-buffered: one command buffer, one set of frame
//! semaphores and one in-flight fence that also guards every uniform buffer.
//! Swapchain-sized state lives in [`FrameTargets`] and [`PipelineSet`], both
//! registered with the device context so recreation rebuilds them in order.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use ash::vk;
use slotmap::SecondaryMap;

use super::core::commands::CommandBuffer;
use super::core::error::{VulkanError, VulkanResult};
use super::core::handle::{CommandPool, DescriptorSetLayout, Fence, Semaphore};
use super::core::render_pass::forward_clear_values;
use super::initialization::device::LogicalDevice;
use super::initialization::queue_family::{QueueFamilyIndices, QueueRoles};
use super::initialization::surface::SurfaceProvider;
use super::model_resources::{create_set_layout, DescriptorBundle, ModelResources};
use super::rendering::{FrameTargets, PipelineSet, ShaderLibrary};
use super::resources::Texture;
use super::state::context::DeviceContext;
use super::state::registry::SwapchainResource;
use super::submit::{record_acquire, record_release, SubmitSync};
use crate::config::ViewerConfig;
use crate::foundation::math::Mat4;
use crate::render::{RenderBackend, RenderError, RenderResult, ShaderType};
use crate::scene::{Model, ModelKey, Scene};

/// Settings the renderer needs from the viewer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RendererSettings {
    /// Application name reported to the driver
    pub application_name: String,
    /// Directory of compiled shader blobs
    pub shader_dir: PathBuf,
    /// Enable validation layers when installed
    pub enable_validation: bool,
    /// Prefer a non-vsync present mode
    pub uncapped_framerate: bool,
    /// Background color
    pub clear_color: [f32; 4],
    /// Initial shader variant
    pub shader_type: ShaderType,
}

impl Default for RendererSettings {
    fn default() -> Self {
        (&ViewerConfig::default()).into()
    }
}

impl From<&ViewerConfig> for RendererSettings {
    fn from(config: &ViewerConfig) -> Self {
        Self {
            application_name: config.application_name.clone(),
            shader_dir: config.shader_dir.clone(),
            enable_validation: config.enable_validation,
            uncapped_framerate: config.uncapped_framerate,
            clear_color: config.clear_color,
            shader_type: config.shader_type,
        }
    }
}

/// Descriptor sets bound for one draw: the model's set, then the material set
pub const fn descriptor_sets_for(
    variant: ShaderType,
    model_set: vk::DescriptorSet,
    dummy_set: vk::DescriptorSet,
) -> [vk::DescriptorSet; 2] {
    if variant.samples_model_texture() {
        [model_set, model_set]
    } else {
        [model_set, dummy_set]
    }
}

/// Frame synchronization objects
#[derive(Debug)]
struct FrameSync {
    image_available: Semaphore,
    render_finished: Semaphore,
    ownership_acquired: Semaphore,
    in_flight: Fence,
    present_done: Fence,
}

impl FrameSync {
    fn new(device: &Arc<LogicalDevice>) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device)?,
            render_finished: Semaphore::new(device)?,
            ownership_acquired: Semaphore::new(device)?,
            in_flight: Fence::new(device, true)?,
            present_done: Fence::new(device, true)?,
        })
    }
}

/// Presentation-queue pool and buffer for the ownership acquire
#[derive(Debug)]
struct OwnershipTransfer {
    cmd: CommandBuffer,
    _pool: CommandPool,
}

/// Everything created by `init`
///
/// Fields drop in declaration order; the device context goes last so the
/// device outlives every child.
struct RendererState {
    models: SecondaryMap<ModelKey, ModelResources>,
    dummy: DescriptorBundle,
    pipelines: Rc<RefCell<PipelineSet>>,
    targets: Rc<RefCell<FrameTargets>>,
    set_layout: DescriptorSetLayout,
    frame_cmd: CommandBuffer,
    transfer: Option<OwnershipTransfer>,
    sync: FrameSync,
    command_pool: CommandPool,
    families: QueueFamilyIndices,
    device: Arc<LogicalDevice>,
    context: DeviceContext,
}

impl RendererState {
    fn new(settings: &RendererSettings, surface: &mut dyn SurfaceProvider) -> VulkanResult<Self> {
        let mut context = DeviceContext::new();
        let extensions = surface.required_instance_extensions()?;
        context.create_instance(&settings.application_name, &extensions, settings.enable_validation)?;
        context.select_physical_device(QueueRoles::GRAPHICS | QueueRoles::PRESENT)?;
        context.attach_surface(surface)?;
        context.create_device()?;
        context.create_swapchain(settings.uncapped_framerate)?;

        let device = Arc::clone(context.device()?);
        let families = device.queue_families();
        let graphics_family = families
            .graphics
            .ok_or_else(|| VulkanError::environment("device has no graphics queue family"))?;

        let command_pool = CommandPool::new(
            &device,
            graphics_family,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let frame_cmd = command_pool.allocate_primary()?;
        let sync = FrameSync::new(&device)?;

        let transfer = match families.present {
            Some(present_family) if families.needs_ownership_transfer() => {
                log::info!(
                    "[renderer] Graphics family {} and present family {} differ, transferring image ownership",
                    graphics_family,
                    present_family
                );
                let pool = CommandPool::new(
                    &device,
                    present_family,
                    vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
                )?;
                let cmd = pool.allocate_primary()?;
                Some(OwnershipTransfer { cmd, _pool: pool })
            }
            _ => None,
        };

        let set_layout = create_set_layout(&device)?;
        let dummy = DescriptorBundle::new(&device, set_layout.handle(), Texture::white(&device, &command_pool)?)?;

        let color_format = context.swapchain()?.params().format.format;
        let targets = Rc::new(RefCell::new(FrameTargets::new(&device, color_format)?));
        let render_pass = targets.borrow().render_pass().handle();
        let pipelines = Rc::new(RefCell::new(PipelineSet::new(
            &device,
            ShaderLibrary::new(settings.shader_dir.clone()),
            set_layout.handle(),
            render_pass,
        )?));

        let targets_resource: Rc<RefCell<dyn SwapchainResource>> = targets.clone();
        let pipelines_resource: Rc<RefCell<dyn SwapchainResource>> = pipelines.clone();
        context.register_swapchain_resource(&targets_resource)?;
        context.register_swapchain_resource(&pipelines_resource)?;

        log::info!(
            "[renderer] Initialized on {} with {} swapchain images",
            device.physical().name,
            context.image_count()
        );
        Ok(Self {
            models: SecondaryMap::new(),
            dummy,
            pipelines,
            targets,
            set_layout,
            frame_cmd,
            transfer,
            sync,
            command_pool,
            families,
            device,
            context,
        })
    }

    fn add_model(&mut self, key: ModelKey, model: &Model) -> VulkanResult<()> {
        if self.models.contains_key(key) {
            log::debug!("[renderer] Model '{}' already has GPU resources", model.name);
            return Ok(());
        }
        let resources = ModelResources::new(&self.device, &self.command_pool, self.set_layout.handle(), model)?;
        self.models.insert(key, resources);
        Ok(())
    }

    fn remove_model(&mut self, key: ModelKey) -> VulkanResult<()> {
        if !self.models.contains_key(key) {
            return Ok(());
        }
        self.device.wait_idle()?;
        self.models.remove(key);
        log::debug!("[renderer] Released model resources ({} remaining)", self.models.len());
        Ok(())
    }

    fn draw_frame(
        &mut self,
        shader_type: ShaderType,
        clear_color: [f32; 4],
        scene: &Scene,
        view: &Mat4,
        projection: &Mat4,
    ) -> VulkanResult<()> {
        self.sync.in_flight.wait(u64::MAX)?;

        let Some(image_index) = self
            .context
            .acquire_next_image(self.sync.image_available.handle())?
        else {
            return Ok(());
        };
        // Reset only once work is certain to be submitted
        self.sync.in_flight.reset()?;

        for (key, model) in scene.iter() {
            if let Some(resources) = self.models.get_mut(key) {
                resources.update_mvp(&model.transform, view, projection)?;
            }
        }

        let image = self
            .context
            .swapchain()?
            .images()
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| VulkanError::validation("renderer", format!("acquired image {image_index} out of range")))?;

        self.record_frame(shader_type, clear_color, scene, image_index, image)?;

        let wait = [self.sync.image_available.handle()];
        let render_finished = [self.sync.render_finished.handle()];
        self.device
            .submit_graphics(
                &self.frame_cmd,
                &SubmitSync {
                    wait: &wait,
                    signal: &render_finished,
                    fence: Some(self.sync.in_flight.handle()),
                },
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            )
            .check("queue")?;

        let present_wait = match &self.transfer {
            Some(transfer) => {
                self.sync.present_done.wait_and_reset()?;
                transfer.cmd.reset()?;
                transfer.cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, None)?;
                record_acquire(&transfer.cmd, image, &self.families);
                transfer.cmd.end()?;

                let acquired = [self.sync.ownership_acquired.handle()];
                self.device
                    .submit_presentation(
                        &transfer.cmd,
                        &SubmitSync {
                            wait: &render_finished,
                            signal: &acquired,
                            fence: Some(self.sync.present_done.handle()),
                        },
                    )
                    .check("queue")?;
                acquired
            }
            None => render_finished,
        };

        self.context.present(&present_wait, image_index)
    }

    fn record_frame(
        &self,
        shader_type: ShaderType,
        clear_color: [f32; 4],
        scene: &Scene,
        image_index: u32,
        image: vk::Image,
    ) -> VulkanResult<()> {
        let cmd = &self.frame_cmd;
        let targets = self.targets.borrow();
        let pipelines = self.pipelines.borrow();

        cmd.reset()?;
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, None)?;

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: targets.extent(),
        };
        let clear_values = forward_clear_values(clear_color);
        targets.render_pass().begin(
            cmd,
            targets.framebuffer(image_index)?,
            render_area,
            &clear_values,
            vk::SubpassContents::INLINE,
        )?;

        cmd.bind_graphics_pipeline(pipelines.pipeline(shader_type)?);
        let drawable = scene
            .iter()
            .filter_map(|(key, _)| self.models.get(key))
            .filter(|resources| resources.vertex_count() > 0);
        for resources in drawable {
            cmd.bind_vertex_buffer(resources.vertex_buffer());
            let sets = descriptor_sets_for(shader_type, resources.descriptor_set(), self.dummy.set());
            cmd.bind_descriptor_sets(pipelines.layout(), 0, &sets);
            cmd.draw(resources.vertex_count(), 1);
        }

        targets.render_pass().end(cmd)?;
        record_release(cmd, image, &self.families);
        cmd.end()
    }
}

impl Drop for RendererState {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("[renderer] Wait idle before teardown failed: {}", e);
        }
    }
}

/// Vulkan render backend
///
/// Construction is cheap; GPU state appears in [`RenderBackend::init`] and
/// goes away in [`RenderBackend::cleanup`] or on drop.
pub struct VulkanRenderer {
    settings: RendererSettings,
    shader_type: ShaderType,
    state: Option<RendererState>,
}

impl VulkanRenderer {
    /// Renderer that has not touched the GPU yet
    pub fn new(settings: RendererSettings) -> Self {
        let shader_type = settings.shader_type;
        Self {
            settings,
            shader_type,
            state: None,
        }
    }

    /// Whether `init` has completed
    pub const fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Number of models with GPU resources
    pub fn model_count(&self) -> usize {
        self.state.as_ref().map_or(0, |state| state.models.len())
    }

    /// Device context, once initialized
    pub fn context(&self) -> Option<&DeviceContext> {
        self.state.as_ref().map(|state| &state.context)
    }

    fn state_mut(&mut self) -> RenderResult<&mut RendererState> {
        self.state.as_mut().ok_or(RenderError::NotInitialized)
    }
}

impl std::fmt::Debug for VulkanRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanRenderer")
            .field("shader_type", &self.shader_type)
            .field("initialized", &self.is_initialized())
            .field("models", &self.model_count())
            .finish()
    }
}

impl RenderBackend for VulkanRenderer {
    fn init(&mut self, surface: &mut dyn SurfaceProvider) -> RenderResult<()> {
        if self.state.is_some() {
            log::warn!("[renderer] init called twice, keeping the existing device");
            return Ok(());
        }
        self.state = Some(RendererState::new(&self.settings, surface)?);
        Ok(())
    }

    fn cleanup(&mut self) {
        if self.state.take().is_some() {
            log::info!("[renderer] Cleaned up");
        }
    }

    fn add_model(&mut self, key: ModelKey, model: &Model) -> RenderResult<()> {
        self.state_mut()?.add_model(key, model)?;
        Ok(())
    }

    fn remove_model(&mut self, key: ModelKey) -> RenderResult<()> {
        match self.state.as_mut() {
            Some(state) => Ok(state.remove_model(key)?),
            None => Ok(()),
        }
    }

    fn set_shader_type(&mut self, shader_type: ShaderType) {
        if self.shader_type != shader_type {
            log::info!("[renderer] Shader variant {:?}", shader_type);
        }
        self.shader_type = shader_type;
    }

    fn shader_type(&self) -> ShaderType {
        self.shader_type
    }

    fn render(&mut self, scene: &Scene, view: &Mat4, projection: &Mat4) -> RenderResult<()> {
        let shader_type = self.shader_type;
        let clear_color = self.settings.clear_color;
        self.state_mut()?
            .draw_frame(shader_type, clear_color, scene, view, projection)?;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if let Some(state) = self.state.as_mut() {
            state.context.notify_resized(vk::Extent2D { width, height });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_follow_config() {
        let config = ViewerConfig::default()
            .with_shader_dir("compiled")
            .with_uncapped_framerate(true)
            .with_clear_color([1.0, 0.0, 0.0, 1.0]);
        let settings = RendererSettings::from(&config);

        assert_eq!(settings.shader_dir, PathBuf::from("compiled"));
        assert!(settings.uncapped_framerate);
        assert_eq!(settings.clear_color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(settings.shader_type, config.shader_type);
    }

    #[test]
    fn test_remove_unknown_model_before_init_is_noop() {
        let mut scene = Scene::new();
        let key = scene.add(Model::new("never uploaded"));
        let mut renderer = VulkanRenderer::new(RendererSettings::default());

        assert!(renderer.remove_model(key).is_ok());
        assert_eq!(renderer.model_count(), 0);
        assert!(!renderer.is_initialized());
    }

    #[test]
    fn test_frame_operations_require_init() {
        let mut scene = Scene::new();
        let key = scene.add(Model::new("cube"));
        let mut renderer = VulkanRenderer::new(RendererSettings::default());
        let identity = Mat4::identity();

        let model = scene.get(key).cloned().unwrap();
        assert!(matches!(renderer.add_model(key, &model), Err(RenderError::NotInitialized)));
        assert!(matches!(
            renderer.render(&scene, &identity, &identity),
            Err(RenderError::NotInitialized)
        ));
        // Ignored before init
        renderer.resize(640, 480);
    }

    #[test]
    fn test_shader_type_round_trips_without_gpu() {
        let mut renderer = VulkanRenderer::new(RendererSettings::default());
        assert_eq!(renderer.shader_type(), ShaderType::Lit);

        renderer.set_shader_type(ShaderType::Wireframe);
        assert_eq!(renderer.shader_type(), ShaderType::Wireframe);
        renderer.cleanup();
        assert_eq!(renderer.shader_type(), ShaderType::Wireframe);
    }

    #[test]
    fn test_material_set_only_for_textured_variant() {
        use ash::vk::Handle;
        let model_set = vk::DescriptorSet::from_raw(1);
        let dummy_set = vk::DescriptorSet::from_raw(2);

        assert_eq!(
            descriptor_sets_for(ShaderType::TexturedMaterial, model_set, dummy_set),
            [model_set, model_set]
        );
        assert_eq!(descriptor_sets_for(ShaderType::Lit, model_set, dummy_set), [model_set, dummy_set]);
        assert_eq!(
            descriptor_sets_for(ShaderType::Wireframe, model_set, dummy_set),
            [model_set, dummy_set]
        );
    }
}
