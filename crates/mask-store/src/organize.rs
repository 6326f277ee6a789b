//! Profile organization: tags, labels, and folders.

use serde::{Deserialize, Serialize};

// Fully qualified paths so expansion sites need no extra imports.
macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub ::uuid::Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(::uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = ::uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(::uuid::Uuid::parse_str(s)?))
            }
        }
    };
}

id_type!(TagId);
id_type!(LabelId);
id_type!(FolderId);

pub(crate) use id_type;

/// A tag attached to profiles, many-to-many.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub icon: String,
}

impl Tag {
    pub fn new(name: &str, color: &str) -> Self {
        Self {
            id: TagId::new(),
            name: name.to_string(),
            color: color.to_string(),
            icon: String::new(),
        }
    }
}

/// A label attached to profiles; same shape as a tag but maintained as a
/// separate pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub icon: String,
}

impl Label {
    pub fn new(name: &str, color: &str) -> Self {
        Self {
            id: LabelId::new(),
            name: name.to_string(),
            color: color.to_string(),
            icon: String::new(),
        }
    }
}

/// Hierarchical profile grouping. The parent chain is acyclic; the store
/// enforces this on every reparent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    pub parent: Option<FolderId>,
}

impl Folder {
    pub fn new(name: &str, parent: Option<FolderId>) -> Self {
        Self {
            id: FolderId::new(),
            name: name.to_string(),
            parent,
        }
    }
}
