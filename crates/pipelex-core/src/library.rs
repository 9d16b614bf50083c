use crate::{
    Concept, ConceptWithMultiplicity, Multiplicity, NativeConceptCode, PipeBlueprint,
    PipeSignature, PipelexBundleBlueprint, PipelexError, load_plx_path, native_code_of,
    parse_concept_with_multiplicity, resolve_concept_string, validate_concept_string,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

/// Every known concept, by concept string. Native concepts are always present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConceptLibrary {
    concepts: BTreeMap<String, Concept>,
}

impl Default for ConceptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl ConceptLibrary {
    pub fn new() -> Self {
        let concepts = NativeConceptCode::ALL
            .into_iter()
            .map(|code| (code.concept_string(), Concept::native(code)))
            .collect();
        Self { concepts }
    }

    /// Adds `concept`; declaring the same concept string twice is only allowed with an
    /// identical definition.
    pub fn add_concept(&mut self, concept: Concept) -> Result<(), PipelexError> {
        let concept_string = concept.concept_string();
        if let Some(existing) = self.concepts.get(&concept_string) {
            if *existing == concept {
                return Ok(());
            }
            return Err(PipelexError::PipeDefinition(format!(
                "concept '{concept_string}' is declared twice with different definitions"
            )));
        }
        self.concepts.insert(concept_string, concept);
        Ok(())
    }

    pub fn add_concepts(
        &mut self,
        concepts: impl IntoIterator<Item = Concept>,
    ) -> Result<(), PipelexError> {
        for concept in concepts {
            self.add_concept(concept)?;
        }
        Ok(())
    }

    pub fn get(&self, concept_string: &str) -> Option<&Concept> {
        self.concepts.get(concept_string)
    }

    pub fn get_required(&self, concept_string: &str) -> Result<&Concept, PipelexError> {
        self.concepts.get(concept_string).ok_or_else(|| {
            PipelexError::NotFound(format!("concept '{concept_string}' is not declared"))
        })
    }

    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.values()
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// The concept strings from `concept_string` up its `refines` links, itself first.
    ///
    /// Fails on an undeclared parent, a cycle, or a chain that does not end at a native
    /// concept.
    pub fn refinement_chain(&self, concept_string: &str) -> Result<Vec<String>, PipelexError> {
        let mut chain = vec![concept_string.to_string()];
        let mut current = self.get_required(concept_string)?;
        while let Some(parent) = &current.refines {
            if chain.contains(parent) {
                return Err(PipelexError::PipeDefinition(format!(
                    "concept '{concept_string}' has a refinement cycle through '{parent}'"
                )));
            }
            chain.push(parent.clone());
            current = self.concepts.get(parent).ok_or_else(|| {
                PipelexError::NotFound(format!(
                    "concept '{}' refines '{parent}' which is not declared",
                    current.concept_string()
                ))
            })?;
        }
        if chain.len() > 1 && !current.is_native() {
            return Err(PipelexError::PipeDefinition(format!(
                "refinement chain of concept '{concept_string}' ends at '{}' instead of a native concept",
                current.concept_string()
            )));
        }
        Ok(chain)
    }

    /// Checks that `concept_string` is well formed, declared, and refines soundly.
    pub fn check_concept(&self, concept_string: &str) -> Result<(), PipelexError> {
        validate_concept_string(concept_string)?;
        self.refinement_chain(concept_string).map(|_| ())
    }

    pub fn validate(&self) -> Result<(), PipelexError> {
        for concept_string in self.concepts.keys() {
            self.refinement_chain(concept_string)?;
        }
        Ok(())
    }

    /// Structure name after inheritance: a refining concept takes the structure of the
    /// native concept its chain ends at.
    pub fn effective_structure(&self, concept_string: &str) -> Option<String> {
        let concept = self.get(concept_string)?;
        if concept.refines.is_none() {
            return Some(concept.structure_class_name.clone());
        }
        let chain = self.refinement_chain(concept_string).ok()?;
        chain
            .last()
            .and_then(|root| native_code_of(root))
            .map(|native| native.structure_class_name().to_string())
    }

    /// Whether a stuff of concept `tested` can be used where `wanted` is expected.
    ///
    /// Strict matching follows `tested`'s refinement chain transitively. Relaxed matching
    /// also accepts a shared `refines` target or a shared structure. `native.Anything` and
    /// `native.Dynamic` accept every concept.
    pub fn is_compatible(&self, tested: &str, wanted: &str, strict: bool) -> bool {
        if tested == wanted {
            return true;
        }
        if native_code_of(wanted).is_some_and(NativeConceptCode::accepts_anything) {
            return true;
        }
        if self
            .refinement_chain(tested)
            .is_ok_and(|chain| chain.iter().any(|ancestor| ancestor == wanted))
        {
            return true;
        }
        if strict {
            return false;
        }
        let (Some(tested_concept), Some(wanted_concept)) = (self.get(tested), self.get(wanted))
        else {
            return false;
        };
        if tested_concept.refines.is_some() && tested_concept.refines == wanted_concept.refines {
            return true;
        }
        match (
            self.effective_structure(tested),
            self.effective_structure(wanted),
        ) {
            (Some(tested_structure), Some(wanted_structure)) => tested_structure == wanted_structure,
            _ => false,
        }
    }
}

/// A concept reference resolved against a domain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptRef {
    pub concept_string: String,
    pub multiplicity: Multiplicity,
}

impl ConceptRef {
    pub fn resolve(domain: &str, reference: &str) -> Result<Self, PipelexError> {
        let ConceptWithMultiplicity {
            concept,
            multiplicity,
        } = parse_concept_with_multiplicity(reference)?;
        Ok(Self {
            concept_string: resolve_concept_string(domain, &concept),
            multiplicity,
        })
    }

    pub fn code(&self) -> &str {
        self.concept_string
            .split_once('.')
            .map_or(self.concept_string.as_str(), |(_, code)| code)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeInput {
    pub name: String,
    pub concept: ConceptRef,
}

/// A pipe bound to its domain, with concept references resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pipe {
    pub code: String,
    pub domain: String,
    pub blueprint: PipeBlueprint,
    pub inputs: Vec<PipeInput>,
    pub output: ConceptRef,
}

impl Pipe {
    pub fn from_blueprint(
        domain: &str,
        code: &str,
        blueprint: PipeBlueprint,
    ) -> Result<Self, PipelexError> {
        blueprint.validate()?;
        let inputs = blueprint
            .inputs()
            .iter()
            .map(|(name, reference)| {
                Ok(PipeInput {
                    name: name.to_string(),
                    concept: ConceptRef::resolve(domain, reference)?,
                })
            })
            .collect::<Result<Vec<_>, PipelexError>>()?;
        let output = ConceptRef::resolve(domain, blueprint.output())?;
        Ok(Self {
            code: code.to_string(),
            domain: domain.to_string(),
            blueprint,
            inputs,
            output,
        })
    }

    pub fn input(&self, name: &str) -> Option<&PipeInput> {
        self.inputs.iter().find(|input| input.name == name)
    }

    pub fn signature(&self) -> Result<PipeSignature, PipelexError> {
        PipeSignature::from_blueprint(&self.code, &self.blueprint)
    }
}

/// Concepts and pipes loaded from one or more bundles.
#[derive(Clone, Debug, Default)]
pub struct PipeLibrary {
    concepts: ConceptLibrary,
    pipes: BTreeMap<String, Pipe>,
}

impl PipeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bundle(bundle: &PipelexBundleBlueprint) -> Result<Self, PipelexError> {
        let mut library = Self::new();
        library.add_bundle(bundle)?;
        Ok(library)
    }

    /// Loads every `.plx` file below `dir`, in path order.
    pub fn load_dir(dir: &Path) -> Result<Self, PipelexError> {
        let pattern = dir.join("**").join("*.plx");
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern).map_err(|error| PipelexError::Io {
            path: dir.display().to_string(),
            message: error.to_string(),
        })?;

        let mut library = Self::new();
        let mut bundle_count = 0usize;
        for entry in paths {
            let path = entry.map_err(|error| PipelexError::Io {
                path: error.path().display().to_string(),
                message: error.to_string(),
            })?;
            let bundle = load_plx_path(&path)?;
            library.add_bundle(&bundle)?;
            bundle_count += 1;
        }
        info!(
            dir = %dir.display(),
            bundles = bundle_count,
            pipes = library.pipes.len(),
            "pipe library loaded"
        );
        Ok(library)
    }

    pub fn add_bundle(&mut self, bundle: &PipelexBundleBlueprint) -> Result<(), PipelexError> {
        bundle.validate()?;
        for (code, entry) in bundle.concepts() {
            let concept = Concept::from_blueprint(&bundle.domain, code, &entry.to_blueprint())?;
            self.concepts.add_concept(concept)?;
        }
        for (code, blueprint) in bundle.pipes() {
            if self.pipes.contains_key(code) {
                return Err(PipelexError::PipeDefinition(format!(
                    "pipe '{code}' is declared more than once"
                )));
            }
            let pipe = Pipe::from_blueprint(&bundle.domain, code, blueprint.clone())?;
            self.pipes.insert(code.to_string(), pipe);
        }
        debug!(domain = bundle.domain.as_str(), "bundle added to library");
        Ok(())
    }

    pub fn concept_library(&self) -> &ConceptLibrary {
        &self.concepts
    }

    pub fn get_pipe(&self, code: &str) -> Option<&Pipe> {
        self.pipes.get(code)
    }

    pub fn get_required_pipe(&self, code: &str) -> Result<&Pipe, PipelexError> {
        self.pipes
            .get(code)
            .ok_or_else(|| PipelexError::NotFound(format!("pipe '{code}' is not in the library")))
    }

    pub fn pipes(&self) -> impl Iterator<Item = &Pipe> {
        self.pipes.values()
    }

    pub fn pipe_codes(&self) -> BTreeSet<&str> {
        self.pipes.keys().map(String::as_str).collect()
    }

    /// Library-wide checks: concept refinements and controller dependencies.
    pub fn validate(&self) -> Result<(), PipelexError> {
        self.concepts.validate()?;
        for pipe in self.pipes.values() {
            for dependency in pipe.blueprint.pipe_dependencies() {
                if !self.pipes.contains_key(&dependency) {
                    return Err(PipelexError::PipeDefinition(format!(
                        "pipe '{}' depends on pipe '{dependency}' which is not declared",
                        pipe.code
                    )));
                }
            }
        }
        Ok(())
    }
}
