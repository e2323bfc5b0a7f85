//! # Index registry of the thermodynamics tables
//!
//! Every table produced by the pipeline is a flat matrix: one row per redshift and one column per
//! physical quantity. This module assigns the column offsets once, before any computation, and
//! freezes them in an [`IndexRegistry`].
//!
//! ## Overview
//!
//! * [`Column`] – trait implemented by the quantity enums, giving each quantity a stable name.
//! * [`ThermoQuantity`], [`RecombinationQuantity`], [`ReionizationQuantity`] – the quantities of
//!   the merged table and of the two transient tables.
//! * [`IndexRegistryBuilder`] – accepts quantities or quantity names; unknown names and
//!   duplicates are reported by [`IndexRegistryBuilder::build`].
//! * [`TableLayouts`] – the three registries required by a given reionization scheme.
//!
//! ## Example
//!
//! ```rust
//! use cosmotherm::indices::{IndexRegistry, ThermoQuantity};
//!
//! let registry = IndexRegistry::<ThermoQuantity>::builder()
//!     .with(ThermoQuantity::Xe)
//!     .with_name("g")
//!     .build()
//!     .unwrap();
//! assert_eq!(registry.width(), 2);
//! assert_eq!(registry.offset(ThermoQuantity::G).unwrap(), 1);
//! ```
use std::fmt;
use std::hash::Hash;

use crate::thermo_errors::ThermoError;
use crate::thermo_params::ReionizationScheme;

/// A quantity that can be stored as a column of a table.
pub trait Column: Copy + Eq + Hash + fmt::Debug + 'static {
    /// Every quantity of this kind, in default layout order.
    const ALL: &'static [Self];

    /// Name used to address the quantity from outside the crate.
    fn name(self) -> &'static str;

    /// Look a quantity up by name.
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|q| q.name() == name)
    }
}

macro_rules! column_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $enum_name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $name:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $enum_name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl Column for $enum_name {
            const ALL: &'static [Self] = &[$( $enum_name::$variant ),+];

            fn name(self) -> &'static str {
                match self {
                    $( $enum_name::$variant => $name ),+
                }
            }
        }

        impl fmt::Display for $enum_name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

column_enum! {
    /// Columns of the merged thermodynamics table.
    pub enum ThermoQuantity {
        /// Free electrons per hydrogen nucleus.
        Xe => "xe",
        /// Thomson scattering rate `dκ/dη` in 1/Mpc.
        Dkappa => "dkappa",
        /// `d²κ/dη²`.
        Ddkappa => "ddkappa",
        /// `d³κ/dη³`.
        Dddkappa => "dddkappa",
        /// `exp(-κ)`, κ being the optical depth from today.
        ExpMKappa => "exp_m_kappa",
        /// Visibility function `g = dκ/dη exp(-κ)`.
        G => "g",
        /// `dg/dη`.
        Dg => "dg",
        /// `d²g/dη²`.
        Ddg => "ddg",
        /// Baryon temperature in K.
        Tb => "Tb",
        /// Squared baryon sound speed (c = 1).
        Cb2 => "cb2",
        /// `d(cb2)/dη`.
        Dcb2 => "dcb2",
        /// Largest variation rate of `exp(-κ)`, `g` and `dg/dη`.
        Rate => "rate",
    }
}

column_enum! {
    /// Columns of the transient recombination table.
    pub enum RecombinationQuantity {
        Xe => "xe",
        Tb => "Tb",
        Cb2 => "cb2",
        Dcb2 => "dcb2",
        Dkappa => "dkappa",
    }
}

column_enum! {
    /// Columns of the transient reionization table.
    pub enum ReionizationQuantity {
        Xe => "xe",
        Tb => "Tb",
        Cb2 => "cb2",
        Dcb2 => "dcb2",
        Dkappa => "dkappa",
        /// `dκ/dz`
        DkappaDz => "dkappa_dz",
        /// `d³κ/dz³`
        D3kappaDz3 => "d3kappa_dz3",
    }
}

/// Frozen mapping from quantity to column offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRegistry<Q: Column> {
    columns: Vec<Q>,
}

impl<Q: Column> IndexRegistry<Q> {
    /// Start an empty layout.
    pub fn builder() -> IndexRegistryBuilder<Q> {
        IndexRegistryBuilder::new()
    }

    /// Layout holding every quantity of `Q` in declaration order.
    pub fn full() -> Self {
        IndexRegistry {
            columns: Q::ALL.to_vec(),
        }
    }

    /// Number of columns of the table.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Column offset of `quantity`.
    ///
    /// Return
    /// ----------
    /// * The offset, or [`ThermoError::UnknownQuantity`] if the quantity is not part of the layout.
    pub fn offset(&self, quantity: Q) -> Result<usize, ThermoError> {
        self.columns
            .iter()
            .position(|&q| q == quantity)
            .ok_or_else(|| ThermoError::UnknownQuantity(quantity.name().to_string()))
    }

    /// Column offset of the quantity called `name`.
    pub fn offset_by_name(&self, name: &str) -> Result<usize, ThermoError> {
        let quantity =
            Q::from_name(name).ok_or_else(|| ThermoError::UnknownQuantity(name.to_string()))?;
        self.offset(quantity)
    }

    /// Quantities in column order.
    pub fn columns(&self) -> &[Q] {
        &self.columns
    }

    /// `(name, offset)` pairs in column order.
    pub fn names(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        self.columns.iter().enumerate().map(|(i, q)| (q.name(), i))
    }
}

/// Fluent builder of an [`IndexRegistry`].
///
/// Errors are remembered and reported once by [`IndexRegistryBuilder::build`], so that a layout
/// can be assembled in one chained expression.
#[derive(Debug)]
pub struct IndexRegistryBuilder<Q: Column> {
    columns: Vec<Q>,
    error: Option<ThermoError>,
}

impl<Q: Column> Default for IndexRegistryBuilder<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q: Column> IndexRegistryBuilder<Q> {
    pub fn new() -> Self {
        IndexRegistryBuilder {
            columns: Vec::new(),
            error: None,
        }
    }

    /// Append `quantity` as the next column.
    pub fn with(mut self, quantity: Q) -> Self {
        if self.error.is_none() {
            if self.columns.contains(&quantity) {
                self.error = Some(ThermoError::DuplicateQuantity(quantity.name().to_string()));
            } else {
                self.columns.push(quantity);
            }
        }
        self
    }

    /// Append the quantity called `name` as the next column.
    pub fn with_name(self, name: &str) -> Self {
        match Q::from_name(name) {
            Some(quantity) => self.with(quantity),
            None => {
                let mut builder = self;
                if builder.error.is_none() {
                    builder.error = Some(ThermoError::UnknownQuantity(name.to_string()));
                }
                builder
            }
        }
    }

    /// Append every quantity of `quantities`.
    pub fn with_all(self, quantities: impl IntoIterator<Item = Q>) -> Self {
        quantities.into_iter().fold(self, |builder, q| builder.with(q))
    }

    /// Freeze the layout.
    ///
    /// Return
    /// ----------
    /// * The registry, or the first [`ThermoError::UnknownQuantity`] /
    ///   [`ThermoError::DuplicateQuantity`] met while building, or a
    ///   [`ThermoError::ConfigurationError`] for an empty layout.
    pub fn build(self) -> Result<IndexRegistry<Q>, ThermoError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.columns.is_empty() {
            return Err(ThermoError::ConfigurationError(
                "a table layout needs at least one column".into(),
            ));
        }
        Ok(IndexRegistry {
            columns: self.columns,
        })
    }
}

/// Layouts of the three tables of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayouts {
    pub thermo: IndexRegistry<ThermoQuantity>,
    pub recombination: IndexRegistry<RecombinationQuantity>,
    /// `None` when the scheme has no reionization stage.
    pub reionization: Option<IndexRegistry<ReionizationQuantity>>,
}

impl TableLayouts {
    /// Layouts required by `scheme`.
    pub fn for_scheme(scheme: &ReionizationScheme) -> Result<Self, ThermoError> {
        let reionization = match scheme {
            ReionizationScheme::None => None,
            ReionizationScheme::Camb(_) => Some(
                IndexRegistry::builder()
                    .with_all(ReionizationQuantity::ALL.iter().copied())
                    .build()?,
            ),
        };
        Ok(TableLayouts {
            thermo: IndexRegistry::builder()
                .with_all(ThermoQuantity::ALL.iter().copied())
                .build()?,
            recombination: IndexRegistry::builder()
                .with_all(RecombinationQuantity::ALL.iter().copied())
                .build()?,
            reionization,
        })
    }
}
