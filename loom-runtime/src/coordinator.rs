use std::collections::{BTreeMap, BTreeSet, VecDeque};

use loom_annotate::{annotate, AnnotationResult};
use loom_backend::BackendRegistry;
use loom_cache::CacheManager;
use loom_ir::{Program, StrandLocation};
use loom_partition::{partition, Swatch};
use loom_transform::{convert_remaps_in_spindle, convert_remaps_to_caches};

use crate::backend::{Backend, CompiledUnit};
use crate::buffers::CrossDomainBuffers;
use crate::config::RuntimeConfig;
use crate::error::LoadError;
use crate::input::InputState;

/// Orders swatches so every provider of a cross-domain edge runs before every
/// consumer of it (§5 "Across swatches within one frame, the swatch graph is
/// walked in topological order"). `partition` groups swatches by backend
/// identifier without regard to this ordering, so the coordinator derives it here
/// from each swatch's `inputs`/`exports` slot indices (Kahn's algorithm); a
/// partitioner respecting its own "no cycle at swatch granularity" invariant
/// always yields a complete order, so any leftover swatches (which would only
/// occur if that invariant were violated upstream) are appended in their
/// original order rather than dropped.
fn topological_order(swatches: Vec<Swatch>) -> Vec<Swatch> {
    let provider_of_slot: BTreeMap<usize, usize> = swatches
        .iter()
        .enumerate()
        .flat_map(|(i, s)| s.exports.iter().map(move |e| (e.index, i)))
        .collect();

    let mut indegree = vec![0usize; swatches.len()];
    let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); swatches.len()];
    for (consumer, swatch) in swatches.iter().enumerate() {
        let mut providers = BTreeSet::new();
        for input in &swatch.inputs {
            if let Some(&provider) = provider_of_slot.get(&input.index) {
                if provider != consumer {
                    providers.insert(provider);
                }
            }
        }
        for provider in providers {
            if dependents[provider].insert(consumer) {
                indegree[consumer] += 1;
            }
        }
    }

    let mut queue: VecDeque<usize> =
        (0..swatches.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(swatches.len());
    let mut visited = vec![false; swatches.len()];
    while let Some(i) = queue.pop_front() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        order.push(i);
        for &dependent in &dependents[i] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }
    for i in 0..swatches.len() {
        if !visited[i] {
            order.push(i);
        }
    }

    let mut slots: Vec<Option<Swatch>> = swatches.into_iter().map(Some).collect();
    order.into_iter().map(|i| slots[i].take().expect("each index appears once")).collect()
}

/// One compiled swatch plus the cross-domain slot it reads/writes, kept in the
/// same order the coordinator walks swatches each frame.
struct CompiledSwatch {
    swatch: Swatch,
    backend: String,
    unit: CompiledUnit,
}

/// Orchestrates one program's lifetime (§4.H): load → lower → annotate →
/// transform → partition → per-backend compile, then steady-state per-frame
/// execution. Owns the cache manager, the cross-domain buffers, and input state;
/// the IR program itself is mutated only while loading and is frozen once
/// `swatches` is populated (§5 "the IR program itself is mutated only during the
/// compile pipeline and is frozen before execution").
pub struct Coordinator {
    config: RuntimeConfig,
    program: Program,
    annotation: AnnotationResult,
    cache: CacheManager,
    swatches: Vec<CompiledSwatch>,
    buffers: CrossDomainBuffers,
    input: InputState,
    width: usize,
    height: usize,
}

impl Coordinator {
    pub fn new(config: RuntimeConfig) -> Self {
        let width = config.initial_width;
        let height = config.initial_height;
        Self {
            config,
            program: Program::new(),
            annotation: AnnotationResult::default(),
            cache: CacheManager::new(Vec::new()),
            swatches: Vec::new(),
            buffers: CrossDomainBuffers::new(0),
            input: InputState::new(),
            width,
            height,
        }
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Reallocates visual-domain cache buffers for a new viewport size (§4.H
    /// "Handles dimension changes by reallocating visual-domain cache buffers").
    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.cache.allocate(width, height);
    }

    /// Runs the full load pipeline: lowers `program`, converts eligible temporal
    /// remaps to caches, annotates hardware/purity, discovers and wires the cache
    /// manager, partitions into swatches, and compiles each one with the backend
    /// instance matching its assigned identifier.
    ///
    /// `backends` supplies one concrete implementation per identifier `registry`
    /// declares; a swatch whose backend has no matching instance fails the load
    /// rather than silently running nowhere.
    pub fn load(
        &mut self,
        mut program: Program,
        registry: &BackendRegistry,
        backends: &BTreeMap<String, Box<dyn Backend>>,
    ) -> Result<(), LoadError> {
        for bundle in program.bundles.values_mut() {
            for strand in &mut bundle.strands {
                strand.expr = convert_remaps_to_caches(&mut program.pool, &bundle.name, strand.index, strand.expr);
            }
        }
        for spindle in program.spindles.values_mut() {
            convert_remaps_in_spindle(&mut program.pool, spindle);
        }

        let annotation = annotate(&program);
        let mut cache =
            loom_cache::build(&mut program, &annotation).with_panic_on_recoverable_error(self.config.panic_on_recoverable_error);
        cache.allocate(self.width, self.height);

        let swatches = topological_order(partition(&program, &annotation, registry)?);
        let mut export_width = 0;
        for swatch in &swatches {
            for export in &swatch.exports {
                export_width = export_width.max(export.index + 1);
            }
        }

        let mut compiled = Vec::with_capacity(swatches.len());
        for (index, swatch) in swatches.into_iter().enumerate() {
            let backend_id = swatch.backend.clone().ok_or_else(|| LoadError::MissingBackendInstance("none".into()))?;
            let instance = backends
                .get(&backend_id)
                .ok_or_else(|| LoadError::MissingBackendInstance(backend_id.clone()))?;
            let unit = instance.compile(&swatch, &program, cache.descriptors()).map_err(|message| {
                LoadError::Compile(crate::error::CompileError {
                    swatch_index: index,
                    backend: Some(backend_id.clone()),
                    message,
                })
            })?;
            compiled.push(CompiledSwatch { swatch, backend: backend_id, unit });
        }

        self.buffers = CrossDomainBuffers::new(export_width);
        self.program = program;
        self.annotation = annotation;
        self.cache = cache;
        self.swatches = compiled;
        Ok(())
    }

    /// Starts every compiled swatch's backend (audio streams, capture devices).
    pub fn start(&mut self, backends: &BTreeMap<String, Box<dyn Backend>>, time: f64) {
        for compiled in &mut self.swatches {
            if let Some(instance) = backends.get(&compiled.backend) {
                instance.start(&mut compiled.unit, time);
            }
        }
    }

    /// Stops every backend instance. The coordinator's only exit path (§5).
    pub fn stop(&self, backends: &BTreeMap<String, Box<dyn Backend>>) {
        for compiled in &self.swatches {
            if let Some(instance) = backends.get(&compiled.backend) {
                instance.stop();
            }
        }
    }

    /// Executes one frame: walks swatches in [`topological_order`], feeding each
    /// one a snapshot of its cross-domain inputs taken once at the top of the
    /// frame (§5 "a stale snapshot is acceptable and the buffer interface returns
    /// one") and routing its outputs back into the shared buffer afterward.
    pub fn run_frame(&mut self, backends: &BTreeMap<String, Box<dyn Backend>>, time: f64) {
        let snapshot = self.buffers.snapshot();
        let mut steps = 0u32;
        for compiled in &mut self.swatches {
            if steps >= self.config.max_frame_cycles {
                log::warn!(target: "loom::runtime", "frame exceeded max_frame_cycles, truncating");
                break;
            }
            steps += 1;
            let Some(instance) = backends.get(&compiled.backend) else {
                if self.config.panic_on_recoverable_error {
                    panic!("no backend instance for swatch '{}'", compiled.backend);
                }
                log::warn!(target: "loom::runtime", "no backend instance for swatch '{}'", compiled.backend);
                continue;
            };
            let inputs: Vec<f64> =
                compiled.swatch.inputs.iter().map(|slot| snapshot.get(slot.index).copied().unwrap_or(0.0)).collect();
            let mut outputs = vec![0.0; compiled.swatch.exports.len()];
            instance.execute(&mut compiled.unit, &inputs, &mut outputs, time);
            for (slot, value) in compiled.swatch.exports.iter().zip(outputs) {
                self.buffers.write(slot.index, value);
            }
        }
    }

    pub fn swatches(&self) -> impl Iterator<Item = &Swatch> {
        self.swatches.iter().map(|c| &c.swatch)
    }

    pub fn strand_locations(&self) -> impl Iterator<Item = &StrandLocation> {
        self.annotation.strands.keys()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use loom_backend::{audio_backend_spec, visual_backend_spec, BackendRegistry};
    use loom_ir::{BinaryOp, Bundle, Expr, Strand};
    use loom_partition::CrossDomainSlot;

    use super::*;

    #[test]
    fn topological_order_runs_providers_before_consumers() {
        let loc = |i: usize| StrandLocation { bundle: "level".into(), strand_index: i };
        let consumer = Swatch {
            backend: Some("visual".into()),
            inputs: vec![CrossDomainSlot { location: loc(0), index: 0 }],
            ..Swatch::default()
        };
        let provider = Swatch {
            backend: Some("audio".into()),
            exports: vec![CrossDomainSlot { location: loc(0), index: 0 }],
            ..Swatch::default()
        };
        // Deliberately out of dependency order on input.
        let ordered = topological_order(vec![consumer, provider]);
        assert_eq!(ordered[0].backend.as_deref(), Some("audio"));
        assert_eq!(ordered[1].backend.as_deref(), Some("visual"));
    }

    #[test]
    fn topological_order_is_a_no_op_without_cross_edges() {
        let a = Swatch { backend: Some("visual".into()), ..Swatch::default() };
        let b = Swatch { backend: Some("audio".into()), ..Swatch::default() };
        let ordered = topological_order(vec![a, b]);
        assert_eq!(ordered.len(), 2);
    }

    struct CountingBackend {
        id: &'static str,
        calls: Arc<AtomicUsize>,
        output: f64,
    }

    impl Backend for CountingBackend {
        fn identifier(&self) -> &str {
            self.id
        }

        fn compile(
            &self,
            _swatch: &Swatch,
            _program: &Program,
            _cache_descriptors: &[loom_ir::CacheDescriptor],
        ) -> Result<CompiledUnit, String> {
            Ok(CompiledUnit::new(()))
        }

        fn execute(&self, _unit: &mut CompiledUnit, _inputs: &[f64], outputs: &mut [f64], _time: f64) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            for slot in outputs {
                *slot = self.output;
            }
        }
    }

    fn registry() -> BackendRegistry {
        BackendRegistry::new(vec![visual_backend_spec(), audio_backend_spec()])
    }

    fn cross_domain_program() -> Program {
        let mut program = Program::new();
        let offset = program.pool.alloc(Expr::Num(0.0.into()));
        let channel = program.pool.alloc(Expr::Num(0.0.into()));
        let mic = program.pool.alloc(Expr::Builtin { name: "microphone".into(), args: vec![offset, channel] });
        program.bundles.insert(
            "level".into(),
            Bundle { name: "level".into(), strands: vec![Strand { name: "v".into(), index: 0, expr: mic }] },
        );
        let zero = program.pool.alloc(Expr::Num(0.0.into()));
        let level_ref = program.pool.alloc(Expr::Index { bundle: "level".into(), index: zero, field: None });
        let half = program.pool.alloc(Expr::Num(0.5.into()));
        let brightness =
            program.pool.alloc(Expr::Binary { op: BinaryOp::Mul, left: level_ref, right: half });
        program.bundles.insert(
            "display".into(),
            Bundle {
                name: "display".into(),
                strands: vec![Strand { name: "r".into(), index: 0, expr: brightness }],
            },
        );
        program
    }

    #[test]
    fn load_then_run_frame_routes_audio_output_into_visual_input() {
        let audio_calls = Arc::new(AtomicUsize::new(0));
        let visual_calls = Arc::new(AtomicUsize::new(0));
        let mut backends: BTreeMap<String, Box<dyn Backend>> = BTreeMap::new();
        backends.insert(
            "audio".into(),
            Box::new(CountingBackend { id: "audio", calls: audio_calls.clone(), output: 2.0 }),
        );
        backends.insert(
            "visual".into(),
            Box::new(CountingBackend { id: "visual", calls: visual_calls.clone(), output: 0.0 }),
        );

        let mut coordinator = Coordinator::new(RuntimeConfig::new(4, 4));
        coordinator.load(cross_domain_program(), &registry(), &backends).unwrap();
        assert_eq!(coordinator.swatches().count(), 2);

        coordinator.run_frame(&backends, 0.0);
        assert_eq!(audio_calls.load(Ordering::SeqCst), 1);
        assert_eq!(visual_calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.buffers.snapshot(), vec![2.0]);
    }

    #[test]
    fn load_fails_without_a_matching_backend_instance() {
        let backends: BTreeMap<String, Box<dyn Backend>> = BTreeMap::new();
        let mut coordinator = Coordinator::new(RuntimeConfig::new(4, 4));
        let err = coordinator.load(cross_domain_program(), &registry(), &backends).unwrap_err();
        assert!(matches!(err, LoadError::MissingBackendInstance(_)));
    }

    #[test]
    #[should_panic(expected = "no backend instance for swatch 'audio'")]
    fn run_frame_panics_on_missing_backend_when_configured() {
        let visual_calls = Arc::new(AtomicUsize::new(0));
        let mut load_backends: BTreeMap<String, Box<dyn Backend>> = BTreeMap::new();
        load_backends.insert(
            "audio".into(),
            Box::new(CountingBackend { id: "audio", calls: Arc::new(AtomicUsize::new(0)), output: 2.0 }),
        );
        load_backends.insert(
            "visual".into(),
            Box::new(CountingBackend { id: "visual", calls: visual_calls.clone(), output: 0.0 }),
        );

        let config = RuntimeConfig::new(4, 4).with_panic_on_recoverable_error(true);
        let mut coordinator = Coordinator::new(config);
        coordinator.load(cross_domain_program(), &registry(), &load_backends).unwrap();

        // Drop the audio instance before running a frame, simulating a backend
        // that failed to start.
        let mut run_backends: BTreeMap<String, Box<dyn Backend>> = BTreeMap::new();
        run_backends.insert(
            "visual".into(),
            Box::new(CountingBackend { id: "visual", calls: visual_calls, output: 0.0 }),
        );
        coordinator.run_frame(&run_backends, 0.0);
    }
}
