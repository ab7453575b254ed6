//! Instrumented memoizing selectors
//!
//! A [`Selector`] combines a tuple of *input extractors* with a *combiner*.
//! Calling [`Selector::select`] runs every extractor against the state, then
//! returns the combiner's output: recomputed if any input's identity changed
//! since the previous call, otherwise the cached value.
//!
//! With tracking enabled, every recomputation is timed and published as a
//! [`ComputationTiming`] event carrying the index of the first changed input.
//! Cache hits publish nothing. Instrumentation never changes what `select`
//! returns.
//!
//! # Identity, not equality
//!
//! Inputs are compared with [`InputIdentity`]: shared handles (`Arc`, `Rc`)
//! by pointer, scalars and strings by value. A reducer that returns the same
//! `Arc` for untouched slices therefore produces cache hits for free.
//!
//! # Example
//!
//! ```
//! use statemeter::runtime::PerfRuntime;
//! use statemeter::selector::SelectorOptions;
//! use std::sync::Arc;
//!
//! struct State {
//!     todos: Arc<Vec<String>>,
//!     filter: u8,
//! }
//!
//! let runtime = PerfRuntime::default();
//! let visible = runtime.create_selector(
//!     (|s: &State| s.todos.clone(), |s: &State| s.filter),
//!     |todos: &Arc<Vec<String>>, filter: &u8| todos.len() * (*filter as usize),
//!     SelectorOptions::named("visibleTodoCount"),
//! );
//!
//! let state = State { todos: Arc::new(vec!["a".into(), "b".into()]), filter: 1 };
//! assert_eq!(visible.select(&state), 2);
//! assert_eq!(visible.select(&state), 2);
//! assert_eq!(visible.recomputations(), 1);
//! ```

use crate::event::{epoch_millis, ComputationTiming, PerfEvent};
use crate::notify::Notice;
use crate::profiling::Stopwatch;
use crate::runtime::PerfRuntime;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

static ANONYMOUS_SELECTORS: AtomicU64 = AtomicU64::new(0);

/// Cheap "same input as last time?" check
///
/// Implementations must never do deep structural comparison of containers;
/// wrap large values in `Arc` so that identity is a pointer comparison.
pub trait InputIdentity {
    fn is_identical(&self, other: &Self) -> bool;
}

impl<T: ?Sized> InputIdentity for Arc<T> {
    fn is_identical(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: ?Sized> InputIdentity for Rc<T> {
    fn is_identical(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: InputIdentity> InputIdentity for Option<T> {
    fn is_identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.is_identical(b),
            (None, None) => true,
            _ => false,
        }
    }
}

macro_rules! identity_by_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl InputIdentity for $ty {
                #[inline]
                fn is_identical(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

identity_by_value!(
    (), bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
    String, &'static str,
);

/// A tuple of input extractors over state `S`
///
/// Implemented for tuples of `Fn(&S) -> T` closures up to eight elements,
/// and for `()` (no inputs: always recompute).
pub trait InputSet<S: ?Sized> {
    /// Tuple of extracted input values
    type Values;

    /// Number of inputs
    const ARITY: usize;

    /// Run every extractor against `state`
    fn extract(&self, state: &S) -> Self::Values;

    /// Index of the first input whose identity differs, or `None` if all match
    fn first_difference(previous: &Self::Values, current: &Self::Values) -> Option<usize>;
}

/// A pure function producing the derived value from the extracted inputs
///
/// Implemented for `Fn(&T0, &T1, ..) -> R` matching the input tuple.
pub trait Combiner<V> {
    type Output;

    fn combine(&self, values: &V) -> Self::Output;
}

impl<S: ?Sized> InputSet<S> for () {
    type Values = ();
    const ARITY: usize = 0;

    fn extract(&self, _state: &S) {}

    fn first_difference(_previous: &(), _current: &()) -> Option<usize> {
        None
    }
}

impl<F, R> Combiner<()> for F
where
    F: Fn() -> R,
{
    type Output = R;

    fn combine(&self, _values: &()) -> R {
        self()
    }
}

macro_rules! impl_arity {
    ($arity:expr; $($extractor:ident $value:ident $idx:tt),+) => {
        impl<S: ?Sized, $($extractor, $value),+> InputSet<S> for ($($extractor,)+)
        where
            $($extractor: Fn(&S) -> $value, $value: InputIdentity,)+
        {
            type Values = ($($value,)+);
            const ARITY: usize = $arity;

            fn extract(&self, state: &S) -> Self::Values {
                ($((self.$idx)(state),)+)
            }

            fn first_difference(previous: &Self::Values, current: &Self::Values) -> Option<usize> {
                $(
                    if !previous.$idx.is_identical(&current.$idx) {
                        return Some($idx);
                    }
                )+
                None
            }
        }

        impl<F, R, $($value),+> Combiner<($($value,)+)> for F
        where
            F: Fn($(&$value),+) -> R,
        {
            type Output = R;

            fn combine(&self, values: &($($value,)+)) -> R {
                self($(&values.$idx),+)
            }
        }
    };
}

impl_arity!(1; E0 T0 0);
impl_arity!(2; E0 T0 0, E1 T1 1);
impl_arity!(3; E0 T0 0, E1 T1 1, E2 T2 2);
impl_arity!(4; E0 T0 0, E1 T1 1, E2 T2 2, E3 T3 3);
impl_arity!(5; E0 T0 0, E1 T1 1, E2 T2 2, E3 T3 3, E4 T4 4);
impl_arity!(6; E0 T0 0, E1 T1 1, E2 T2 2, E3 T3 3, E4 T4 4, E5 T5 5);
impl_arity!(7; E0 T0 0, E1 T1 1, E2 T2 2, E3 T3 3, E4 T4 4, E5 T5 5, E6 T6 6);
impl_arity!(8; E0 T0 0, E1 T1 1, E2 T2 2, E3 T3 3, E4 T4 4, E5 T5 5, E6 T6 6, E7 T7 7);

/// Options accepted at selector construction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorOptions {
    /// Name used in events and summaries; takes precedence over inference
    pub name: Option<String>,
}

impl SelectorOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// Resolve a selector's name once, at construction
///
/// Order: explicit name, then the combiner's declared name when it is a
/// named `fn` item, then `AnonymousSelector-<n>`. Anonymous numbering is
/// process-wide and only stable within one run.
pub fn resolve_name<C>(explicit: Option<String>) -> String {
    explicit
        .filter(|name| !name.is_empty())
        .or_else(declared_name::<C>)
        .unwrap_or_else(|| {
            let n = ANONYMOUS_SELECTORS.fetch_add(1, Ordering::Relaxed) + 1;
            format!("AnonymousSelector-{}", n)
        })
}

/// Declared name of a function item type, `None` for closures and fn pointers
///
/// Relies on `std::any::type_name`, whose exact format is best-effort.
fn declared_name<C>() -> Option<String> {
    let full = std::any::type_name::<C>();
    if full.contains("{{closure}}") {
        return None;
    }
    let path = strip_generic_groups(full);
    let last = path.rsplit("::").next()?;
    let is_identifier = !last.is_empty()
        && !last.starts_with(|c: char| c.is_ascii_digit())
        && last.chars().all(|c| c.is_alphanumeric() || c == '_');
    is_identifier.then(|| last.to_string())
}

/// Remove balanced `<...>` groups, including `<T as Trait>` qualifiers
///
/// `Wrapper<u8>::doubled` becomes `Wrapper::doubled` and
/// `<Impl as Calc>::tripled` becomes `::tripled`. The `>` of a `->` arrow is
/// not a closing bracket.
fn strip_generic_groups(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut depth = 0usize;
    let mut previous = None;
    for c in path.chars() {
        match c {
            '<' => depth += 1,
            '>' if depth > 0 && previous != Some('-') => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
        previous = Some(c);
    }
    out
}

struct Memo<V, R> {
    inputs: V,
    result: R,
}

/// Outcome of comparing current inputs with the stored ones
enum Lookup<R> {
    Hit(R),
    Miss { changed_index: Option<usize> },
}

/// An instrumented memoized selector; see the module docs
pub struct Selector<S: ?Sized, I, C>
where
    I: InputSet<S>,
    C: Combiner<I::Values>,
{
    name: String,
    inputs: I,
    combiner: C,
    memo: Mutex<Option<Memo<I::Values, C::Output>>>,
    recomputations: AtomicU64,
    runtime: PerfRuntime,
    _state: PhantomData<fn(&S)>,
}

impl<S: ?Sized, I, C> Selector<S, I, C>
where
    I: InputSet<S>,
    C: Combiner<I::Values>,
    C::Output: Clone,
{
    /// Build a selector; prefer [`PerfRuntime::create_selector`]
    pub fn new(runtime: PerfRuntime, inputs: I, combiner: C, options: SelectorOptions) -> Self {
        Self {
            name: resolve_name::<C>(options.name),
            inputs,
            combiner,
            memo: Mutex::new(None),
            recomputations: AtomicU64::new(0),
            runtime,
            _state: PhantomData,
        }
    }

    /// Evaluate the selector against `state`
    ///
    /// Returns exactly what an uninstrumented memoized selector would. A
    /// panic in an extractor or the combiner propagates unchanged and leaves
    /// the cache as it was.
    pub fn select(&self, state: &S) -> C::Output {
        if !self.runtime.config().selector_tracking_enabled() {
            let values = self.inputs.extract(state);
            return match self.lookup(&values) {
                Lookup::Hit(result) => result,
                Lookup::Miss { .. } => self.recompute(values),
            };
        }

        // Only the memoized call is timed; extractors run before the stopwatch.
        let values = self.inputs.extract(state);
        let stopwatch = Stopwatch::start();
        match self.lookup(&values) {
            Lookup::Hit(result) => result,
            Lookup::Miss { changed_index } => {
                let result = self.recompute(values);
                self.report(stopwatch.elapsed_ms(), changed_index);
                result
            }
        }
    }

    /// Name used in events
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of combiner invocations so far
    pub fn recomputations(&self) -> u64 {
        self.recomputations.load(Ordering::Relaxed)
    }

    pub fn reset_recomputations(&self) {
        self.recomputations.store(0, Ordering::Relaxed);
    }

    /// Most recently computed value, if any
    pub fn last_result(&self) -> Option<C::Output> {
        self.lock_memo().as_ref().map(|memo| memo.result.clone())
    }

    /// Forget the stored inputs; the next call recomputes
    pub fn clear_cache(&self) {
        *self.lock_memo() = None;
    }

    fn lookup(&self, values: &I::Values) -> Lookup<C::Output> {
        if I::ARITY == 0 {
            return Lookup::Miss {
                changed_index: None,
            };
        }
        match self.lock_memo().as_ref() {
            None => Lookup::Miss {
                changed_index: None,
            },
            Some(memo) => match I::first_difference(&memo.inputs, values) {
                None => Lookup::Hit(memo.result.clone()),
                Some(index) => Lookup::Miss {
                    changed_index: Some(index),
                },
            },
        }
    }

    // The memo lock is not held while the combiner runs.
    fn recompute(&self, values: I::Values) -> C::Output {
        let result = self.combiner.combine(&values);
        self.recomputations.fetch_add(1, Ordering::Relaxed);
        *self.lock_memo() = Some(Memo {
            inputs: values,
            result: result.clone(),
        });
        result
    }

    fn report(&self, duration_ms: f64, changed_index: Option<usize>) {
        let threshold_ms = self.runtime.config().snapshot().slow_computation_threshold_ms;
        if duration_ms > threshold_ms {
            self.runtime.notify(&Notice::SlowComputation {
                name: self.name.clone(),
                duration_ms,
                threshold_ms,
            });
        }

        self.runtime
            .channel()
            .publish(PerfEvent::ComputationTiming(ComputationTiming {
                name: self.name.clone(),
                duration: duration_ms,
                recomputation: true,
                changed_index,
                timestamp: epoch_millis(),
            }));
    }

    fn lock_memo(&self) -> std::sync::MutexGuard<'_, Option<Memo<I::Values, C::Output>>> {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: ?Sized, I, C> fmt::Debug for Selector<S, I, C>
where
    I: InputSet<S>,
    C: Combiner<I::Values>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("name", &self.name)
            .field("arity", &I::ARITY)
            .field("recomputations", &self.recomputations.load(Ordering::Relaxed))
            .finish()
    }
}
