//! # Component Trait - Participant Lifecycle Contract
//!
//! Defines the contract every component implements to take part in a
//! participant, whether it lives in the host binary or in a loaded plugin.
//!
//! ## Lifecycle
//!
//! ```text
//! create → initialize → tense → start ⇄ stop → relax → deinitialize → destroy
//! ```
//!
//! `tense`/`relax` bracket the window in which clocks and schedulers may be
//! queried before time actually starts. `start`/`stop` may repeat without a
//! full `relax`/`tense` cycle.
//!
//! ## Interfaces
//!
//! A component is identified by an interface id (IID). Typed access to a
//! component goes through [`ComponentInterface`], implemented on the trait
//! object type of each interface (`dyn ClockService`, `dyn JobRegistry`, ...):
//!
//! ```rust,ignore
//! let clock_service = get_component::<dyn ClockService>(components.as_ref())
//!     .ok_or_else(|| ParticipantError::not_found("clock service"))?;
//! ```

use crate::errors::Result;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// The lifecycle every participant component goes through.
///
/// All transitions default to a no-op so components only override what
/// they need.
pub trait Component: Send + Sync {
    /// Interface id of this component. Immutable for the component's lifetime.
    fn iid(&self) -> &str;

    /// Called once after construction with the lookup service of the
    /// owning registry. Components that keep `components` must release it
    /// in [`Component::destroy`].
    fn create(&self, _components: Arc<dyn Components>) -> Result<()> {
        Ok(())
    }

    /// Called once before the component is dropped by its registry.
    fn destroy(&self) -> Result<()> {
        Ok(())
    }

    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn tense(&self) -> Result<()> {
        Ok(())
    }

    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn relax(&self) -> Result<()> {
        Ok(())
    }

    fn deinitialize(&self) -> Result<()> {
        Ok(())
    }
}

/// Marks a trait object type as a component interface with a fixed IID.
///
/// Implemented for `dyn ClockService`, `dyn JobRegistry` and the other
/// interface traits of this crate.
pub trait ComponentInterface: Component + 'static {
    /// Interface id string; compared exactly on lookup.
    const IID: &'static str;
}

/// Type-erased reference to a component interface, as returned by
/// [`Components::find_component`].
#[derive(Clone)]
pub struct InterfaceHandle {
    iid: String,
    interface: Arc<dyn Any + Send + Sync>,
    component: Arc<dyn Component>,
}

impl InterfaceHandle {
    /// Wrap a typed interface.
    pub fn new<I: ?Sized + ComponentInterface>(interface: Arc<I>) -> Self {
        Self {
            iid: I::IID.to_string(),
            component: component_ref(Arc::clone(&interface)),
            interface: Arc::new(interface),
        }
    }

    /// Wrap a typed interface whose lifecycle is driven through a separate
    /// component object.
    pub fn with_component<I: ?Sized + ComponentInterface>(
        interface: Arc<I>,
        component: Arc<dyn Component>,
    ) -> Self {
        Self {
            iid: I::IID.to_string(),
            interface: Arc::new(interface),
            component,
        }
    }

    /// A component whose interface is unknown to this binary. Only its
    /// lifecycle is reachable.
    pub fn untyped(component: Arc<dyn Component>) -> Self {
        Self {
            iid: component.iid().to_string(),
            interface: Arc::new(Arc::clone(&component)),
            component,
        }
    }

    /// Interface id this handle was registered under.
    #[must_use]
    pub fn iid(&self) -> &str {
        &self.iid
    }

    /// Recover the typed interface. Returns `None` if `I` is not the
    /// interface this handle was created from.
    #[must_use]
    pub fn downcast<I: ?Sized + ComponentInterface>(&self) -> Option<Arc<I>> {
        self.interface.downcast_ref::<Arc<I>>().cloned()
    }

    /// Lifecycle view of the same component.
    #[must_use]
    pub fn component(&self) -> Arc<dyn Component> {
        Arc::clone(&self.component)
    }
}

impl fmt::Debug for InterfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceHandle")
            .field("iid", &self.iid)
            .finish()
    }
}

/// Lookup service over the components of one participant.
pub trait Components: Send + Sync {
    /// First registered component whose IID equals `iid`, else `None`.
    fn find_component(&self, iid: &str) -> Option<InterfaceHandle>;
}

/// Typed lookup helper over [`Components::find_component`].
pub fn get_component<I: ?Sized + ComponentInterface>(
    components: &dyn Components,
) -> Option<Arc<I>> {
    components.find_component(I::IID)?.downcast::<I>()
}

/// View any component interface object as a plain [`Component`].
pub fn component_ref<I: ?Sized + Component + 'static>(interface: Arc<I>) -> Arc<dyn Component> {
    Arc::new(LifecycleView(interface))
}

struct LifecycleView<I: ?Sized>(Arc<I>);

impl<I: ?Sized + Component> Component for LifecycleView<I> {
    fn iid(&self) -> &str {
        self.0.iid()
    }

    fn create(&self, components: Arc<dyn Components>) -> Result<()> {
        self.0.create(components)
    }

    fn destroy(&self) -> Result<()> {
        self.0.destroy()
    }

    fn initialize(&self) -> Result<()> {
        self.0.initialize()
    }

    fn tense(&self) -> Result<()> {
        self.0.tense()
    }

    fn start(&self) -> Result<()> {
        self.0.start()
    }

    fn stop(&self) -> Result<()> {
        self.0.stop()
    }

    fn relax(&self) -> Result<()> {
        self.0.relax()
    }

    fn deinitialize(&self) -> Result<()> {
        self.0.deinitialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Greeter: Component {
        fn greet(&self) -> String;
    }

    impl ComponentInterface for dyn Greeter {
        const IID: &'static str = "greeter.test.iid";
    }

    #[derive(Default)]
    struct English {
        starts: AtomicUsize,
    }

    impl Component for English {
        fn iid(&self) -> &str {
            <dyn Greeter as ComponentInterface>::IID
        }

        fn start(&self) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_interface_handle_downcast() {
        let greeter: Arc<dyn Greeter> = Arc::new(English::default());
        let handle = InterfaceHandle::new(greeter);

        assert_eq!(handle.iid(), "greeter.test.iid");
        let typed = handle.downcast::<dyn Greeter>().expect("same interface");
        assert_eq!(typed.greet(), "hello");
    }

    #[test]
    fn test_lifecycle_view_delegates() {
        let english = Arc::new(English::default());
        let component = component_ref(Arc::clone(&english));

        component.start().expect("start");
        component.start().expect("start again");
        assert_eq!(english.starts.load(Ordering::SeqCst), 2);
        assert_eq!(component.iid(), "greeter.test.iid");
    }
}
