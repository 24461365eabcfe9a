//! Smart value resolution for LedgerOps scenes.
//!
//! Scene fields are "smart values": plain YAML values whose strings may
//! reference other data through a leading sigil or a braced reference.
//!
//! | Syntax | Source |
//! |---|---|
//! | `$NAME`, `${NAME}` | environment variable |
//! | `&KEY`, `&{KEY}` | configuration option (case-insensitive) |
//! | `%a.b[0]`, `%{a.b[0]}` | scenario data |
//! | `=1 + 2`, `={1 + 2}` | formula |
//!
//! References compose (`%{%{owner}_token}.identifier`,
//! `=%{amount} * 2`) and a backslash escapes the special characters
//! (`\%`, `\{`). `$` and `&` accept a `:type` suffix such as `$AMOUNT:int`.
//!
//! ```
//! use ledgerops_formula::FormulaRng;
//! use ledgerops_resolve::{Config, MapEnv, ResolveContext, Resolver, ValueType};
//! use ledgerops_store::{DataPath, Network, ScenarioData, Value};
//!
//! let mut scenario = ScenarioData::new(Network::Devnet, "demo");
//! scenario
//!     .set(&DataPath::parse("alice.address").unwrap(), Value::from("erd1alice"))
//!     .unwrap();
//! let config = Config::builtin(Network::Devnet);
//! let env = MapEnv::new();
//! let mut rng = FormulaRng::with_seed(1);
//! let mut resolver = Resolver::new(ResolveContext {
//!     scenario: &scenario,
//!     config: &config,
//!     env: &env,
//!     rng: &mut rng,
//! });
//! let value = resolver.resolve_str("%{alice.address}_suffix", ValueType::Any).unwrap();
//! assert_eq!(value, Value::from("erd1alice_suffix"));
//! ```

pub mod coerce;
pub mod config;
pub mod env;
pub mod error;
pub mod resolver;
pub mod scene;
pub mod smart;
pub mod template;

pub use coerce::ValueType;
pub use config::{Config, CONFIG_ENV, LOCAL_CONFIG_FILE};
pub use env::{Environment, MapEnv, ProcessEnv};
pub use error::{ResolveError, Result};
pub use resolver::{ResolveContext, Resolver, ResolverOptions, DEFAULT_MAX_DEPTH};
pub use scene::{BuiltinOnly, LoopStep, NewEntity, Runner, Scene, Step, StepHandler, StepOutcome};
pub use smart::SmartValue;
pub use template::{Node, Sigil, Template, TemplateError};
