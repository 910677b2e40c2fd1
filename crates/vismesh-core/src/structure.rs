//! Structure descriptor parsing and canonical network naming.
//!
//! A network's topology is fully determined by a two-level descriptor string:
//! groups separated by `_`, per-group layer output widths separated by `-`.
//! `"4-4-4_8-8"` describes two groups, five graph-convolution layers in total,
//! the last one 8 units wide. The canonical name of the network is the
//! descriptor rendered back with the same separators; external collaborators
//! key output directories on it, so it must be deterministic and distinct for
//! distinct descriptors.

use crate::errors::{Result, VisualMeshError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between groups in the descriptor string.
const GROUP_SEPARATOR: char = '_';
/// Separator between layer widths within a group.
const WIDTH_SEPARATOR: char = '-';

/// Parsed network structure: groups of positive layer output widths.
///
/// Immutable after construction; parsed once from configuration at process
/// start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureDescriptor {
    groups: Vec<Vec<usize>>,
}

impl StructureDescriptor {
    /// Build a descriptor from already-parsed groups, validating the
    /// structural invariants (at least one group, at least one layer per
    /// group, every width positive).
    pub fn new(groups: Vec<Vec<usize>>) -> Result<Self> {
        if groups.is_empty() {
            return Err(VisualMeshError::config(
                "structure descriptor must contain at least one group",
            ));
        }
        for (i, group) in groups.iter().enumerate() {
            if group.is_empty() {
                return Err(VisualMeshError::config(format!(
                    "structure descriptor group {} is empty",
                    i
                )));
            }
            if let Some(&width) = group.iter().find(|&&w| w == 0) {
                return Err(VisualMeshError::config(format!(
                    "structure descriptor group {} contains non-positive width {}",
                    i, width
                )));
            }
        }
        Ok(Self { groups })
    }

    /// The nested groups of layer widths.
    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    /// All layer output widths in network order, groups flattened.
    pub fn widths(&self) -> impl Iterator<Item = usize> + '_ {
        self.groups.iter().flatten().copied()
    }

    /// Total number of graph-convolution layers described.
    pub fn num_layers(&self) -> usize {
        self.groups.iter().map(|g| g.len()).sum()
    }

    /// Output width of the final layer (the network's category count).
    pub fn output_width(&self) -> usize {
        // new() guarantees a non-empty final group
        *self
            .groups
            .last()
            .and_then(|g| g.last())
            .expect("validated descriptor has at least one width")
    }

    /// Deterministic canonical name: widths joined with `-`, groups joined
    /// with `_`. Distinct descriptors always produce distinct names since
    /// the rendering is the inverse of parsing.
    pub fn canonical_name(&self) -> String {
        self.groups
            .iter()
            .map(|g| {
                g.iter()
                    .map(|w| w.to_string())
                    .collect::<Vec<_>>()
                    .join(&WIDTH_SEPARATOR.to_string())
            })
            .collect::<Vec<_>>()
            .join(&GROUP_SEPARATOR.to_string())
    }
}

impl FromStr for StructureDescriptor {
    type Err = VisualMeshError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(VisualMeshError::config("structure descriptor is empty"));
        }
        let groups = s
            .split(GROUP_SEPARATOR)
            .map(|group| {
                group
                    .split(WIDTH_SEPARATOR)
                    .map(|width| {
                        width.parse::<usize>().map_err(|_| {
                            VisualMeshError::config(format!(
                                "invalid layer width '{}' in structure descriptor '{}'",
                                width, s
                            ))
                        })
                    })
                    .collect::<Result<Vec<usize>>>()
            })
            .collect::<Result<Vec<Vec<usize>>>>()?;
        StructureDescriptor::new(groups)
    }
}

impl fmt::Display for StructureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_level_descriptor() {
        let d: StructureDescriptor = "4-4-4_8-8".parse().unwrap();
        assert_eq!(d.groups(), &[vec![4, 4, 4], vec![8, 8]]);
        assert_eq!(d.num_layers(), 5);
        assert_eq!(d.output_width(), 8);
    }

    #[test]
    fn canonical_name_round_trips() {
        for text in ["4-4-4_8-8", "16", "2-3_4-5_6"] {
            let d: StructureDescriptor = text.parse().unwrap();
            assert_eq!(d.canonical_name(), text);
            let d2: StructureDescriptor = d.canonical_name().parse().unwrap();
            assert_eq!(d, d2);
        }
    }

    #[test]
    fn distinct_descriptors_get_distinct_names() {
        let a: StructureDescriptor = "4-4_8".parse().unwrap();
        let b: StructureDescriptor = "4_4-8".parse().unwrap();
        let c: StructureDescriptor = "4-4-8".parse().unwrap();
        assert_ne!(a.canonical_name(), b.canonical_name());
        assert_ne!(a.canonical_name(), c.canonical_name());
        assert_ne!(b.canonical_name(), c.canonical_name());
    }

    #[test]
    fn rejects_malformed_descriptors() {
        assert!("".parse::<StructureDescriptor>().is_err());
        assert!("4-x_8".parse::<StructureDescriptor>().is_err());
        assert!("4-0_8".parse::<StructureDescriptor>().is_err());
        assert!("4__8".parse::<StructureDescriptor>().is_err());
        assert!("4-_8".parse::<StructureDescriptor>().is_err());
    }

    #[test]
    fn widths_flatten_in_network_order() {
        let d: StructureDescriptor = "2-3_4".parse().unwrap();
        let widths: Vec<usize> = d.widths().collect();
        assert_eq!(widths, vec![2, 3, 4]);
    }
}
