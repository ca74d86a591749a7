//! Realm provisioning
//!
//! Every plan gets a fresh, isolated global environment: many test bodies
//! intentionally mutate built-ins (`Array.prototype`, `Object.prototype`),
//! so nothing may leak between plans. Provisioning seeds the realm in a
//! fixed order: engine-debug no-ops, the `$262` host-control shim, then the
//! resolved harness includes. `raw` plans get a bare realm with no seeding
//! at all.

use std::sync::Arc;

use tracing::trace;

use crate::engine::{Engine, Realm};
use crate::error::{Error, Result};
use crate::includes::IncludeResolver;
use crate::planner::ExecutionPlan;

/// Diagnostic/microbenchmark hooks referenced by optional scripts in the
/// corpus. Unimplemented hooks are harmless no-ops, never failures; each is
/// defined only if the engine did not already provide it.
const DEBUG_HOOK_PRELUDE: &str = r#"
(function(global) {
    var hooks = [
        'noInline', 'noDFG', 'noFTL', 'noOSRExitFuzzing',
        'numberOfDFGCompiles', 'fiatInt52', 'OSRExit',
        'gc', 'edenGC', 'fullGC', 'optimizeNextInvocation'
    ];
    for (var i = 0; i < hooks.length; i++) {
        if (typeof global[hooks[i]] === 'undefined') {
            global[hooks[i]] = function() {};
        }
    }
})(this);
"#;

/// Minimal `$262` host-control object.
///
/// `evalScript` is shimmed with indirect eval; the realm-creation surface
/// throws a recognizable error. Tests that genuinely need cross-realm
/// support declare the `cross-realm` feature and are screened by the gate
/// before they reach a realm, so the throwing stubs are never a source of
/// false failures.
const HOST_CONTROLS_SHIM: &str = r#"
(function(global) {
    if (typeof global.$262 !== 'undefined') { return; }
    global.$262 = {
        global: global,
        evalScript: function(src) { return (0, eval)(src); },
        createRealm: function() {
            throw new Error('$262.createRealm is not supported by this host');
        },
        detachArrayBuffer: function() {
            throw new Error('$262.detachArrayBuffer is not supported by this host');
        },
        gc: function() {}
    };
})(this);
"#;

/// Builds and seeds one realm per plan.
pub struct RealmFactory {
    engine: Arc<dyn Engine>,
    resolver: Arc<IncludeResolver>,
}

impl RealmFactory {
    pub fn new(engine: Arc<dyn Engine>, resolver: Arc<IncludeResolver>) -> Self {
        Self { engine, resolver }
    }

    /// Create a fresh realm and seed it for the given plan.
    ///
    /// Any throw during seeding is a test-infrastructure error for this
    /// plan, not an engine verdict.
    pub fn provision(&self, plan: &ExecutionPlan) -> Result<Box<dyn Realm>> {
        let mut realm = self.engine.create_realm()?;
        let path = &plan.descriptor.path;

        if plan.descriptor.is_raw() {
            trace!(path = %path.display(), "provisioned bare realm for raw plan");
            return Ok(realm);
        }

        self.seed(realm.as_mut(), plan, "<debug-hooks>", DEBUG_HOOK_PRELUDE)?;
        self.seed(realm.as_mut(), plan, "<host-controls>", HOST_CONTROLS_SHIM)?;

        let includes = self.resolver.resolve(&plan.descriptor)?;
        for script in &includes {
            self.seed(realm.as_mut(), plan, &script.name, &script.source)?;
        }
        trace!(
            path = %path.display(),
            includes = includes.len(),
            "provisioned realm"
        );
        Ok(realm)
    }

    fn seed(
        &self,
        realm: &mut dyn Realm,
        plan: &ExecutionPlan,
        name: &str,
        source: &str,
    ) -> Result<()> {
        realm.seed(name, source).map_err(|thrown| {
            Error::realm(
                &plan.descriptor.path,
                format!("seeding '{name}' threw {thrown}"),
            )
        })?;
        Ok(())
    }
}
