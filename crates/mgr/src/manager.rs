use std::sync::Arc;

use hideseek_assets::{ObjImporter, ObjectImporter, RenderAssetCatalog};
use hideseek_common::{Config, ExecMode};
use hideseek_kernel::{EpisodeManager, WorldInit, WorldState};
use hideseek_physics::{
    MAX_OBJECTS, ObjectManager, PhysicsLoader, StorageType, load_static_primitives,
};

#[cfg(feature = "gpu")]
use crate::backend::gpu::{DeviceEpisodeManager, GpuBackend, GpuContext, GpuWorldInit};
use crate::backend::{Backend, CpuBackend, ExportSlot, TensorSource};
use crate::error::ManagerError;
use crate::tensor::{ElementType, Tensor};

/// Where the shared episode counter lives.
#[derive(Debug)]
enum EpisodeStore {
    Host(Arc<EpisodeManager>),
    #[cfg(feature = "gpu")]
    Device(DeviceEpisodeManager),
}

/// Owns every world of one training run and steps them in lockstep.
///
/// Construction either yields a fully initialized manager or an error; there
/// is no partially built state. Tensors borrow the manager immutably and
/// [`Manager::step`] borrows it mutably, so no view can be held across a step.
#[derive(Debug)]
pub struct Manager {
    cfg: Config,
    physics: Arc<ObjectManager>,
    episodes: EpisodeStore,
    backend: Backend,
}

impl Manager {
    /// Build a manager, importing the static meshes with the OBJ importer.
    pub fn new(cfg: Config) -> Result<Self, ManagerError> {
        Self::with_importer(cfg, &ObjImporter::new())
    }

    /// Build a manager with a caller-supplied geometry importer.
    pub fn with_importer(cfg: Config, importer: &dyn ObjectImporter) -> Result<Self, ManagerError> {
        cfg.validate()?;
        let _span = tracing::info_span!(
            "manager_init",
            mode = %cfg.exec_mode,
            worlds = cfg.num_worlds
        )
        .entered();

        #[cfg(not(feature = "gpu"))]
        if cfg.exec_mode == ExecMode::Gpu {
            return Err(ManagerError::BackendUnavailable(cfg.exec_mode));
        }

        let render_assets = RenderAssetCatalog::load_static(importer, &cfg.data_dir)?;

        let storage = match cfg.exec_mode {
            ExecMode::Cpu => StorageType::Host,
            ExecMode::Gpu => StorageType::Device,
        };
        let mut loader = PhysicsLoader::new(storage, MAX_OBJECTS);
        load_static_primitives(&mut loader)?;
        let physics = Arc::new(loader.into_object_manager());

        let (episodes, backend) = match cfg.exec_mode {
            ExecMode::Cpu => {
                let episode_mgr = Arc::new(EpisodeManager::new());
                let inits = replicate(&episode_mgr, &physics, cfg.num_worlds);
                let backend = CpuBackend::new(inits, cfg.render_size(), render_assets);
                (EpisodeStore::Host(episode_mgr), Backend::Cpu(backend))
            }
            #[cfg(feature = "gpu")]
            ExecMode::Gpu => {
                let gpu_id = cfg
                    .gpu_id
                    .ok_or(hideseek_common::ConfigError::MissingGpuId)?;
                let context = Arc::new(GpuContext::new(gpu_id, cfg.compile_mode())?);
                let episode_mgr = DeviceEpisodeManager::new(Arc::clone(&context));
                let inits = vec![GpuWorldInit::default(); cfg.num_worlds as usize];
                let backend = GpuBackend::new(
                    context,
                    &episode_mgr,
                    &inits,
                    &physics,
                    cfg.render_size(),
                    &render_assets,
                )?;
                (EpisodeStore::Device(episode_mgr), Backend::Gpu(backend))
            }
            #[cfg(not(feature = "gpu"))]
            ExecMode::Gpu => return Err(ManagerError::BackendUnavailable(cfg.exec_mode)),
        };

        tracing::info!(
            objects = physics.len(),
            render_objects = backend.num_render_objects(),
            "manager ready"
        );
        Ok(Self {
            cfg,
            physics,
            episodes,
            backend,
        })
    }

    /// Advance every world by one step. Blocks until the step is complete.
    ///
    /// # Panics
    /// Panics if the GPU rejects the step's work; device state is undefined
    /// after such a failure.
    pub fn step(&mut self) {
        self.backend.step();
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn exec_mode(&self) -> ExecMode {
        self.cfg.exec_mode
    }

    pub fn num_worlds(&self) -> usize {
        self.cfg.num_worlds as usize
    }

    pub fn physics_objects(&self) -> &ObjectManager {
        &self.physics
    }

    pub fn num_render_objects(&self) -> usize {
        self.backend.num_render_objects()
    }

    /// Episodes started so far across all worlds.
    pub fn episodes_started(&self) -> Result<u32, ManagerError> {
        match &self.episodes {
            EpisodeStore::Host(mgr) => Ok(mgr.episodes_started()),
            #[cfg(feature = "gpu")]
            EpisodeStore::Device(mgr) => Ok(mgr.episodes_started()?),
        }
    }

    /// Snapshot of every world's state, in world order.
    pub fn world_states(&self) -> Result<Vec<WorldState>, ManagerError> {
        match &self.backend {
            Backend::Cpu(cpu) => Ok(cpu.world_states()),
            #[cfg(feature = "gpu")]
            Backend::Gpu(gpu) => Ok(gpu.world_states()?),
        }
    }

    /// View over an exported buffer. `element_type` and `dims` are trusted.
    pub fn export_tensor(
        &self,
        slot: ExportSlot,
        element_type: ElementType,
        dims: Vec<i64>,
    ) -> Tensor<'_> {
        self.backend.tensor(TensorSource::Exported(slot), element_type, dims)
    }

    /// Per-world reset flags, `[N, 1]` `Int32`.
    pub fn reset_tensor(&self) -> Tensor<'_> {
        self.export_tensor(ExportSlot::Reset, ElementType::Int32, vec![self.n(), 1])
    }

    /// Per-world move actions, `[N, 1]` `Int32`.
    pub fn move_action_tensor(&self) -> Tensor<'_> {
        self.export_tensor(ExportSlot::Action, ElementType::Int32, vec![self.n(), 1])
    }

    /// Per-world agent positions as (x, z), `[N, 2]` `Float32`.
    pub fn position_tensor(&self) -> Tensor<'_> {
        self.export_tensor(ExportSlot::Position, ElementType::Float32, vec![self.n(), 2])
    }

    /// Depth observations, `[N, H, W, 1]` `Float32`.
    pub fn depth_tensor(&self) -> Tensor<'_> {
        let (h, w) = self.image_dims();
        self.backend
            .tensor(TensorSource::Depth, ElementType::Float32, vec![self.n(), h, w, 1])
    }

    /// Color observations, `[N, H, W, 4]` `UInt8`.
    pub fn rgb_tensor(&self) -> Tensor<'_> {
        let (h, w) = self.image_dims();
        self.backend
            .tensor(TensorSource::Rgb, ElementType::UInt8, vec![self.n(), h, w, 4])
    }

    fn n(&self) -> i64 {
        i64::from(self.cfg.num_worlds)
    }

    fn image_dims(&self) -> (i64, i64) {
        (
            i64::from(self.cfg.render_height),
            i64::from(self.cfg.render_width),
        )
    }
}

/// One init record per world, all sharing the episode counter and catalog.
fn replicate(
    episode_mgr: &Arc<EpisodeManager>,
    physics: &Arc<ObjectManager>,
    num_worlds: u32,
) -> Vec<WorldInit> {
    (0..num_worlds)
        .map(|_| WorldInit::new(Arc::clone(episode_mgr), Arc::clone(physics)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hideseek_assets::{AssetError, ImportedObject, SourceMesh};
    use hideseek_common::ConfigError;
    use hideseek_kernel::observe::{MAX_DEPTH, SKY_COLOR};
    use hideseek_physics::{CollisionPrimitive, ObjectId, PrimitiveKind};
    use std::path::Path;

    fn cfg(num_worlds: u32, width: u32, height: u32) -> Config {
        Config {
            num_worlds,
            render_width: width,
            render_height: height,
            ..Config::default()
        }
    }

    fn positions(mgr: &Manager) -> Vec<[f32; 2]> {
        let flat = mgr.position_tensor().copy_to_vec::<f32>().unwrap();
        flat.chunks_exact(2).map(|p| [p[0], p[1]]).collect()
    }

    /// Returns one triangle for every path.
    struct TriangleImporter;

    impl ObjectImporter for TriangleImporter {
        fn import_object(&self, path: &Path) -> Result<ImportedObject, AssetError> {
            Ok(ImportedObject {
                name: path.display().to_string(),
                meshes: vec![SourceMesh {
                    positions: vec![Default::default(); 3],
                    normals: vec![Default::default(); 3],
                    uvs: vec![Default::default(); 3],
                    indices: vec![0, 1, 2],
                }],
            })
        }
    }

    #[test]
    fn tensor_shapes() {
        let mgr = Manager::new(cfg(4, 8, 6)).unwrap();
        let reset = mgr.reset_tensor();
        assert_eq!(reset.shape(), &[4, 1]);
        assert_eq!(reset.element_type(), ElementType::Int32);
        assert_eq!(reset.gpu_id(), None);
        assert_eq!(mgr.move_action_tensor().shape(), &[4, 1]);
        assert_eq!(mgr.move_action_tensor().element_type(), ElementType::Int32);
        assert_eq!(mgr.position_tensor().shape(), &[4, 2]);
        assert_eq!(mgr.depth_tensor().shape(), &[4, 6, 8, 1]);
        assert_eq!(mgr.depth_tensor().element_type(), ElementType::Float32);
        assert_eq!(mgr.rgb_tensor().shape(), &[4, 6, 8, 4]);
        assert_eq!(mgr.rgb_tensor().element_type(), ElementType::UInt8);
    }

    #[test]
    fn four_world_cpu_scenario() {
        let mut mgr = Manager::new(cfg(4, 0, 0)).unwrap();
        assert_eq!(mgr.reset_tensor().copy_to_vec::<i32>().unwrap(), vec![0; 4]);
        assert_eq!(mgr.episodes_started().unwrap(), 4);

        mgr.move_action_tensor()
            .copy_from_slice(&[1i32, 4, 0, 3])
            .unwrap();
        mgr.step();

        assert_eq!(
            positions(&mgr),
            vec![[0.0, 1.0], [1.0, 0.0], [0.0, 0.0], [-1.0, 0.0]]
        );
        assert_eq!(mgr.reset_tensor().copy_to_vec::<i32>().unwrap(), vec![0; 4]);
        assert_eq!(mgr.episodes_started().unwrap(), 4);
        assert!(mgr.world_states().unwrap().iter().all(|s| s.episode_step == 1));
    }

    #[test]
    fn worlds_only_touch_their_own_slots() {
        let mut mgr = Manager::new(cfg(4, 0, 0)).unwrap();
        let before = mgr.world_states().unwrap();

        mgr.move_action_tensor()
            .copy_from_slice(&[0i32, 0, 4, 0])
            .unwrap();
        mgr.reset_tensor().copy_from_slice(&[0i32, 1, 0, 0]).unwrap();
        mgr.step();

        let after = mgr.world_states().unwrap();
        assert_eq!(positions(&mgr)[2], [1.0, 0.0]);
        for world in [0, 3] {
            assert_eq!(after[world].position, [0.0, 0.0]);
            assert_eq!(after[world].episode, before[world].episode);
        }
        assert_ne!(after[1].episode, before[1].episode);
        assert_eq!(after[1].episode_step, 0);
        assert_eq!(mgr.reset_tensor().copy_to_vec::<i32>().unwrap(), vec![0; 4]);
        assert_eq!(mgr.episodes_started().unwrap(), 5);
    }

    #[test]
    fn zero_render_size_yields_empty_images() {
        let mut mgr = Manager::new(cfg(3, 0, 8)).unwrap();
        mgr.step();
        let depth = mgr.depth_tensor();
        assert_eq!(depth.shape(), &[3, 8, 0, 1]);
        assert_eq!(depth.num_elements(), 0);
        assert!(depth.copy_to_vec::<f32>().unwrap().is_empty());
        assert_eq!(mgr.rgb_tensor().shape(), &[3, 8, 0, 4]);
        assert!(mgr.rgb_tensor().copy_to_vec::<u8>().unwrap().is_empty());
    }

    #[test]
    fn observations_are_rendered_per_world() {
        let mut mgr = Manager::new(cfg(2, 4, 4)).unwrap();
        mgr.move_action_tensor().copy_from_slice(&[0i32, 4]).unwrap();
        mgr.step();

        let depth = mgr.depth_tensor().copy_to_vec::<f32>().unwrap();
        let rgb = mgr.rgb_tensor().copy_to_vec::<u8>().unwrap();
        assert_eq!(depth.len(), 2 * 16);
        assert_eq!(rgb.len(), 2 * 16 * 4);
        // Top-left pixel looks above the horizon.
        assert_eq!(depth[0], MAX_DEPTH);
        assert_eq!(&rgb[..4], &SKY_COLOR);
        assert!(depth[15] < MAX_DEPTH);
        // Same camera height, so depth matches even though the worlds differ.
        assert_eq!(depth[..16], depth[16..]);
    }

    #[test]
    fn stepping_is_deterministic() {
        let run = || {
            let mut mgr = Manager::new(cfg(8, 6, 4)).unwrap();
            for step in 0..12 {
                let actions: Vec<i32> = (0..8).map(|i| (step + i) % 5).collect();
                mgr.move_action_tensor().copy_from_slice(&actions).unwrap();
                if step == 6 {
                    mgr.reset_tensor()
                        .copy_from_slice(&[1i32, 0, 0, 0, 0, 0, 0, 1])
                        .unwrap();
                }
                mgr.step();
            }
            (
                positions(&mgr),
                mgr.depth_tensor().copy_to_vec::<f32>().unwrap(),
                mgr.rgb_tensor().copy_to_vec::<u8>().unwrap(),
                mgr.episodes_started().unwrap(),
            )
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn host_views_alias_backend_memory_across_steps() {
        let mut mgr = Manager::new(cfg(2, 0, 0)).unwrap();
        let before = mgr.position_tensor().data_ptr() as usize;
        assert_ne!(before, 0);
        mgr.move_action_tensor().copy_from_slice(&[4i32, 4]).unwrap();
        mgr.step();
        let tensor = mgr.position_tensor();
        assert_eq!(tensor.data_ptr() as usize, before);
        // SAFETY: the view covers two f32 per world and the manager is borrowed.
        let x0 = unsafe { *(tensor.data_ptr() as *const f32) };
        assert_eq!(x0, 1.0);
    }

    #[test]
    fn export_tensor_trusts_caller_layout() {
        let mgr = Manager::new(cfg(2, 0, 0)).unwrap();
        mgr.reset_tensor().copy_from_slice(&[1i32, 0]).unwrap();
        let bytes = mgr
            .export_tensor(ExportSlot::Reset, ElementType::UInt8, vec![8])
            .copy_to_vec::<u8>()
            .unwrap();
        assert_eq!(bytes, [1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn physics_catalog_is_loaded_in_order() {
        let mgr = Manager::new(cfg(1, 0, 0)).unwrap();
        let objects = mgr.physics_objects();
        assert_eq!(objects.len(), 3);
        let kinds: Vec<PrimitiveKind> = objects.iter().map(|(_, _, _, p)| p.kind()).collect();
        assert_eq!(
            kinds,
            [PrimitiveKind::Sphere, PrimitiveKind::Plane, PrimitiveKind::Hull]
        );
        assert!(matches!(
            objects.primitive(ObjectId::SPHERE),
            Some(CollisionPrimitive::Sphere { radius }) if *radius == 1.0
        ));
        assert_eq!(mgr.num_render_objects(), 3);
        assert_eq!(mgr.exec_mode(), ExecMode::Cpu);
        assert_eq!(mgr.num_worlds(), 1);
    }

    #[test]
    fn custom_importer_is_used() {
        let mgr = Manager::with_importer(cfg(1, 0, 0), &TriangleImporter).unwrap();
        assert_eq!(mgr.num_render_objects(), 3);
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(matches!(
            Manager::new(cfg(0, 0, 0)),
            Err(ManagerError::Config(ConfigError::NoWorlds))
        ));
        let gpu_without_id = Config {
            exec_mode: ExecMode::Gpu,
            ..cfg(1, 0, 0)
        };
        assert!(matches!(
            Manager::new(gpu_without_id),
            Err(ManagerError::Config(ConfigError::MissingGpuId))
        ));
    }

    #[test]
    fn missing_meshes_abort_construction() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            data_dir: dir.path().to_path_buf(),
            ..cfg(1, 0, 0)
        };
        match Manager::new(cfg) {
            Err(ManagerError::Assets(AssetError::StaticObject { name, .. })) => {
                assert_eq!(name, "sphere");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn gpu_requires_gpu_support() {
        let cfg = Config {
            exec_mode: ExecMode::Gpu,
            gpu_id: Some(0),
            ..cfg(4, 0, 0)
        };
        assert!(matches!(
            Manager::new(cfg),
            Err(ManagerError::BackendUnavailable(ExecMode::Gpu))
        ));
    }

    #[cfg(feature = "gpu")]
    mod gpu {
        use super::*;
        use crate::GpuError;

        /// `None` when this machine has no usable adapter.
        fn gpu_manager(cfg: Config) -> Option<Manager> {
            let cfg = Config {
                exec_mode: ExecMode::Gpu,
                gpu_id: Some(0),
                debug_compile: true,
                ..cfg
            };
            match Manager::new(cfg) {
                Ok(mgr) => Some(mgr),
                Err(ManagerError::Gpu(err)) => {
                    eprintln!("skipping gpu test: {err}");
                    None
                }
                Err(err) => panic!("unexpected error: {err}"),
            }
        }

        #[test]
        fn device_tensors_carry_gpu_id() {
            let Some(mgr) = gpu_manager(cfg(4, 4, 4)) else {
                return;
            };
            let reset = mgr.reset_tensor();
            assert_eq!(reset.gpu_id(), Some(0));
            assert!(reset.is_device());
            assert!(reset.data_ptr().is_null());
            assert!(reset.device_buffer().is_some());
            assert_eq!(reset.shape(), &[4, 1]);
            assert_eq!(reset.copy_to_vec::<i32>().unwrap(), vec![0; 4]);
            assert_eq!(mgr.episodes_started().unwrap(), 4);
        }

        #[test]
        fn gpu_matches_cpu() {
            let Some(mut gpu) = gpu_manager(cfg(6, 8, 8)) else {
                return;
            };
            let mut cpu = Manager::new(cfg(6, 8, 8)).unwrap();
            for step in 0..10 {
                let actions: Vec<i32> = (0..6).map(|i| (step * 3 + i) % 5).collect();
                for mgr in [&cpu, &gpu] {
                    mgr.move_action_tensor().copy_from_slice(&actions).unwrap();
                    if step == 4 {
                        mgr.reset_tensor()
                            .copy_from_slice(&[0i32, 1, 0, 0, 1, 0])
                            .unwrap();
                    }
                }
                cpu.step();
                gpu.step();
            }

            assert_eq!(positions(&gpu), positions(&cpu));
            assert_eq!(gpu.reset_tensor().copy_to_vec::<i32>().unwrap(), vec![0; 6]);
            assert_eq!(gpu.episodes_started().unwrap(), cpu.episodes_started().unwrap());
            let steps = |m: &Manager| -> Vec<u32> {
                m.world_states().unwrap().iter().map(|s| s.episode_step).collect()
            };
            assert_eq!(steps(&gpu), steps(&cpu));

            let gpu_depth = gpu.depth_tensor().copy_to_vec::<f32>().unwrap();
            let cpu_depth = cpu.depth_tensor().copy_to_vec::<f32>().unwrap();
            assert_eq!(gpu_depth.len(), cpu_depth.len());
            for (g, c) in gpu_depth.iter().zip(&cpu_depth) {
                assert!((g - c).abs() < 1e-2, "depth {g} vs {c}");
            }
            let gpu_rgb = gpu.rgb_tensor().copy_to_vec::<u8>().unwrap();
            let cpu_rgb = cpu.rgb_tensor().copy_to_vec::<u8>().unwrap();
            let same = gpu_rgb.iter().zip(&cpu_rgb).filter(|(g, c)| g == c).count();
            // Tile edges may round differently on the device.
            assert!(same * 100 >= cpu_rgb.len() * 95);
        }

        fn step_labels(mgr: &Manager) -> Vec<&'static str> {
            match &mgr.backend {
                Backend::Gpu(gpu) => gpu.step_node_labels(),
                Backend::Cpu(_) => panic!("expected gpu backend"),
            }
        }

        #[test]
        fn four_world_gpu_scenario() {
            let Some(mut mgr) = gpu_manager(cfg(4, 0, 0)) else {
                return;
            };
            mgr.move_action_tensor()
                .copy_from_slice(&[1i32, 4, 0, 3])
                .unwrap();
            mgr.step();

            assert_eq!(
                positions(&mgr),
                vec![[0.0, 1.0], [1.0, 0.0], [0.0, 0.0], [-1.0, 0.0]]
            );
            assert_eq!(mgr.reset_tensor().copy_to_vec::<i32>().unwrap(), vec![0; 4]);
            let states = mgr.world_states().unwrap();
            assert_eq!(states.len(), 4);
            assert!(states.iter().all(|s| s.episode_step == 1));
            assert_eq!(states[1].position, [1.0, 0.0]);
        }

        #[test]
        fn zero_render_size_on_device() {
            let Some(mut mgr) = gpu_manager(cfg(4, 0, 0)) else {
                return;
            };
            mgr.step();
            assert_eq!(step_labels(&mgr), ["step_worlds", "export_positions"]);

            let depth = mgr.depth_tensor();
            assert!(depth.is_device());
            assert_eq!(depth.shape(), &[4, 0, 0, 1]);
            assert!(depth.copy_to_vec::<f32>().unwrap().is_empty());
            assert_eq!(mgr.rgb_tensor().shape(), &[4, 0, 0, 4]);
            assert!(mgr.rgb_tensor().copy_to_vec::<u8>().unwrap().is_empty());
        }

        #[test]
        fn render_node_runs_with_images() {
            let Some(mgr) = gpu_manager(cfg(2, 4, 4)) else {
                return;
            };
            assert_eq!(
                step_labels(&mgr),
                ["step_worlds", "export_positions", "render_observations"]
            );
            let Backend::Gpu(gpu) = &mgr.backend else {
                unreachable!();
            };
            // Two worlds of 4x4 depth and packed color at least.
            assert!(gpu.resident_bytes() >= 2 * 16 * 8);
        }

        #[test]
        fn every_world_claims_a_distinct_episode() {
            let Some(mgr) = gpu_manager(cfg(1000, 0, 0)) else {
                return;
            };
            assert_eq!(mgr.episodes_started().unwrap(), 1000);
            let mut episodes: Vec<u32> =
                mgr.world_states().unwrap().iter().map(|s| s.episode).collect();
            episodes.sort_unstable();
            assert_eq!(episodes, (0..1000).collect::<Vec<u32>>());
        }

        #[test]
        fn missing_adapter_is_an_error() {
            let cfg = Config {
                exec_mode: ExecMode::Gpu,
                gpu_id: Some(u32::MAX),
                ..cfg(1, 0, 0)
            };
            assert!(matches!(
                Manager::new(cfg),
                Err(ManagerError::Gpu(GpuError::AdapterNotFound { .. }))
            ));
        }
    }
}
