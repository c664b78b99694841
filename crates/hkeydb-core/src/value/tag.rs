///
/// ValueTag
///
/// Stable canonical value-variant tag used by ordering and hashing surfaces.
///
/// IMPORTANT:
/// Tag values are written into persisted keys and must remain fixed.
///
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum ValueTag {
    Null = 1,
    Bool = 2,
    Int = 3,
    Uint = 4,
    Float64 = 5,
    Text = 6,
    Blob = 7,
}

impl ValueTag {
    /// Stable key byte tag for this variant.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Null),
            2 => Some(Self::Bool),
            3 => Some(Self::Int),
            4 => Some(Self::Uint),
            5 => Some(Self::Float64),
            6 => Some(Self::Text),
            7 => Some(Self::Blob),
            _ => None,
        }
    }

    /// Stable human-readable value kind label for diagnostics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool => "Bool",
            Self::Int => "Int",
            Self::Uint => "Uint",
            Self::Float64 => "Float64",
            Self::Text => "Text",
            Self::Blob => "Blob",
        }
    }
}
