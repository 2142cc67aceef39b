//! Core type definitions for the DermaMNIST baseline.

use serde::{Deserialize, Serialize};

/// Number of lesion classes in DermaMNIST
pub const NUM_CLASSES: usize = 7;

/// Native side length of DermaMNIST images
pub const NATIVE_IMAGE_SIZE: usize = 28;

/// Side length after the fixed 2-pixel padding
pub const IMAGE_SIZE: usize = 32;

/// Number of image channels (RGB)
pub const CHANNELS: usize = 3;

/// Dermatology lesion categories, in label-index order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LesionClass {
    ActinicKeratoses,
    BasalCellCarcinoma,
    BenignKeratosis,
    Dermatofibroma,
    Melanoma,
    MelanocyticNevi,
    VascularLesions,
}

impl LesionClass {
    /// All classes in label-index order
    pub const ALL: [LesionClass; NUM_CLASSES] = [
        LesionClass::ActinicKeratoses,
        LesionClass::BasalCellCarcinoma,
        LesionClass::BenignKeratosis,
        LesionClass::Dermatofibroma,
        LesionClass::Melanoma,
        LesionClass::MelanocyticNevi,
        LesionClass::VascularLesions,
    ];

    /// Look up a class by its label index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Label index of this class
    pub fn index(self) -> usize {
        self as usize
    }

    /// Human-readable class name
    pub fn name(self) -> &'static str {
        match self {
            LesionClass::ActinicKeratoses => "actinic keratoses and intraepithelial carcinoma",
            LesionClass::BasalCellCarcinoma => "basal cell carcinoma",
            LesionClass::BenignKeratosis => "benign keratosis-like lesions",
            LesionClass::Dermatofibroma => "dermatofibroma",
            LesionClass::Melanoma => "melanoma",
            LesionClass::MelanocyticNevi => "melanocytic nevi",
            LesionClass::VascularLesions => "vascular lesions",
        }
    }

    /// Class names in label-index order
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|class| class.name()).collect()
    }
}

impl std::fmt::Display for LesionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Data split type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DataSplit {
    /// Training data
    Train,
    /// Validation data
    Validation,
    /// Test data
    Test,
}

impl DataSplit {
    /// Key prefix of this split's arrays inside the dataset archive
    pub fn archive_prefix(self) -> &'static str {
        match self {
            DataSplit::Train => "train",
            DataSplit::Validation => "val",
            DataSplit::Test => "test",
        }
    }
}

impl std::fmt::Display for DataSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSplit::Train => write!(f, "train"),
            DataSplit::Validation => write!(f, "validation"),
            DataSplit::Test => write!(f, "test"),
        }
    }
}

/// Device backend type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// CPU backend
    #[default]
    Cpu,
    /// CUDA/GPU backend
    Cuda,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Cpu => write!(f, "cpu"),
            DeviceType::Cuda => write!(f, "cuda"),
        }
    }
}
