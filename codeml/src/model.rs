//! The fixed table of codon models and the control files built from it.

use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

/// Model identifiers accepted by the generator. Parsing ignores case.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum ModelId {
    M0,
    FR,
    BM,
    #[strum(to_string = "M1a")]
    M1A,
    #[strum(to_string = "M2a")]
    M2A,
    M7,
    M8,
    #[strum(to_string = "M8a")]
    M8A,
    #[strum(to_string = "Ah0")]
    AH0,
    #[strum(to_string = "Ah1")]
    AH1,
}

/// Parameters of one codeml run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelDescriptor {
    pub model: ModelId,
    /// Appended to the result and control file names.
    pub suffix: &'static str,
    /// codeml `model`: 0 one ratio, 1 free ratios, 2 branch classes.
    pub codeml_model: u8,
    pub ns_sites: u8,
    pub fix_omega: bool,
    /// Initial or fixed omega.
    pub omega: f64,
}

const fn descriptor(
    model: ModelId,
    suffix: &'static str,
    codeml_model: u8,
    ns_sites: u8,
    fix_omega: bool,
    omega: f64,
) -> ModelDescriptor {
    ModelDescriptor {
        model,
        suffix,
        codeml_model,
        ns_sites,
        fix_omega,
        omega,
    }
}

const M0: [ModelDescriptor; 3] = [
    descriptor(ModelId::M0, ".M0_e05", 0, 0, false, 0.5),
    descriptor(ModelId::M0, ".M0_e10", 0, 0, false, 1.0),
    descriptor(ModelId::M0, ".M0_f10", 0, 0, true, 1.0),
];
const FR: [ModelDescriptor; 1] = [descriptor(ModelId::FR, ".FR_e1", 1, 0, false, 1.0)];
const BM: [ModelDescriptor; 2] = [
    descriptor(ModelId::BM, ".BM_f1", 2, 0, true, 1.0),
    descriptor(ModelId::BM, ".BM_e1", 2, 0, false, 1.0),
];
const M1A: [ModelDescriptor; 1] = [descriptor(ModelId::M1A, ".M1a_e1", 0, 1, false, 1.0)];
const M2A: [ModelDescriptor; 1] = [descriptor(ModelId::M2A, ".M2a_e1", 0, 2, false, 1.0)];
const M7: [ModelDescriptor; 1] = [descriptor(ModelId::M7, ".M7_e1", 0, 7, false, 1.0)];
const M8: [ModelDescriptor; 1] = [descriptor(ModelId::M8, ".M8_e1", 0, 8, false, 1.0)];
const M8A: [ModelDescriptor; 1] = [descriptor(ModelId::M8A, ".M8a", 0, 8, true, 1.0)];
const AH0: [ModelDescriptor; 1] = [descriptor(ModelId::AH0, ".Ah0", 2, 2, true, 1.0)];
const AH1: [ModelDescriptor; 1] = [descriptor(ModelId::AH1, ".Ah1", 2, 2, false, 1.5)];

impl ModelId {
    pub fn descriptors(self) -> &'static [ModelDescriptor] {
        match self {
            ModelId::M0 => &M0,
            ModelId::FR => &FR,
            ModelId::BM => &BM,
            ModelId::M1A => &M1A,
            ModelId::M2A => &M2A,
            ModelId::M7 => &M7,
            ModelId::M8 => &M8,
            ModelId::M8A => &M8A,
            ModelId::AH0 => &AH0,
            ModelId::AH1 => &AH1,
        }
    }

    /// Models generated together with this one when asked to.
    pub fn partners(self) -> &'static [ModelId] {
        match self {
            ModelId::M1A => &[ModelId::M2A],
            ModelId::M2A => &[ModelId::M1A],
            ModelId::M7 => &[ModelId::M8],
            ModelId::M8 => &[ModelId::M7, ModelId::M8A],
            ModelId::M8A => &[ModelId::M8],
            ModelId::AH0 => &[ModelId::AH1],
            ModelId::AH1 => &[ModelId::AH0],
            ModelId::M0 | ModelId::FR | ModelId::BM => &[],
        }
    }

    /// Whether the model needs a marked foreground branch in the tree.
    pub fn needs_foreground(self) -> bool {
        matches!(self, ModelId::BM | ModelId::AH0 | ModelId::AH1)
    }

    pub fn description(self) -> &'static str {
        match self {
            ModelId::M0 => "one-ratio model",
            ModelId::FR => "free-ratio branch model",
            ModelId::BM => "branch model, one foreground branch class",
            ModelId::M1A => "site model, nearly neutral",
            ModelId::M2A => "site model, positive selection",
            ModelId::M7 => "site model, beta",
            ModelId::M8 => "site model, beta and omega > 1",
            ModelId::M8A => "site model, beta and omega = 1",
            ModelId::AH0 => "branch-site model A, null (omega = 1 fixed)",
            ModelId::AH1 => "branch-site model A, alternative",
        }
    }

    /// The model table, one line per model.
    pub fn help_table() -> String {
        let mut table = format!("{:<6}{:<48}{}\n", "model", "description", "vs");
        for model in ModelId::iter() {
            let partners = model
                .partners()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            table.push_str(&format!(
                "{:<6}{:<48}{}\n",
                model.to_string(),
                model.description(),
                partners
            ));
        }
        table
    }
}

impl Serialize for ModelId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ModelId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ModelIdVisitor;
        impl<'de> Visitor<'de> for ModelIdVisitor {
            type Value = ModelId;
            fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str("one of M0, FR, BM, M1a, M2a, M7, M8, M8a, Ah0, Ah1")
            }

            fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                ModelId::from_str(s.trim())
                    .map_err(|_| E::custom(format!("unknown model '{s}'")))
            }
        }
        deserializer.deserialize_str(ModelIdVisitor)
    }
}

/// A codeml control file. File names are written as given; codeml is run
/// from the directory holding them.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlFile {
    pub seqfile: String,
    pub treefile: String,
    pub outfile: String,
    pub descriptor: ModelDescriptor,
}

impl Display for ControlFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let d = &self.descriptor;
        writeln!(f, "seqfile = {}", self.seqfile)?;
        writeln!(f, "treefile = {}", self.treefile)?;
        writeln!(f, "outfile = {}", self.outfile)?;
        writeln!(f, "runmode = 0")?;
        writeln!(f, "seqtype = 1")?;
        writeln!(f, "CodonFreq = 2")?;
        writeln!(f, "model = {}", d.codeml_model)?;
        writeln!(f, "NSsites = {}", d.ns_sites)?;
        writeln!(f, "fix_kappa = 0")?;
        writeln!(f, "kappa = 2")?;
        writeln!(f, "fix_omega = {}", u8::from(d.fix_omega))?;
        writeln!(f, "omega = {}", d.omega)?;
        writeln!(f, "getSE = 0")?;
        writeln!(f, "RateAncestor = 0")?;
        writeln!(f, "Small_Diff = .5e-6")?;
        writeln!(f, "cleandata = 1")?;
        writeln!(f, "method = 0")
    }
}
