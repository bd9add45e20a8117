//! Readiness probe over a live Chrome tab
//!
//! Every script here is self-contained: it installs whatever page state it
//! needs (`window.__recorderPending`) and only receives plain values from the
//! host, so a navigation between two calls just means the next call starts
//! from scratch.

use super::chrome::{evaluate_typed, handle_of};
use crate::error::{RecorderError, Result};
use crate::readiness::{
    LoadingIndicatorPatterns, PendingResource, ReadinessProbe, ResourceOutcome,
};
use crate::screenshot::TargetHandle;
use async_trait::async_trait;
use chromiumoxide::page::Page;
use std::time::Duration;

/// Slack on top of an in-page timer before the host gives up on the call
const EVALUATE_GRACE: Duration = Duration::from_secs(1);

const PENDING_RESOURCES_SCRIPT: &str = r#"(() => {
    const pending = [];
    const settled = (el) => {
        switch (el.tagName.toLowerCase()) {
            case 'img':
                return el.complete && el.naturalHeight !== 0 || (el.complete && !el.currentSrc);
            case 'iframe':
                try {
                    const doc = el.contentDocument;
                    return !doc || doc.readyState === 'complete';
                } catch (_) {
                    return true;
                }
            case 'video':
                return el.readyState >= 2 || (!el.currentSrc && !el.src);
            default:
                return true;
        }
    };
    for (const el of document.querySelectorAll('img, iframe, video')) {
        if (!settled(el)) pending.push(el);
    }
    window.__recorderPending = pending;
    return pending.map((el, id) => ({
        id,
        kind: el.tagName.toLowerCase() === 'img' ? 'image' : el.tagName.toLowerCase(),
        source: el.currentSrc || el.src || null,
    }));
})()"#;

fn mutation_script(window: Duration) -> String {
    format!(
        r#"new Promise(resolve => {{
    const root = document.body || document.documentElement;
    if (!root) {{ resolve(false); return; }}
    let timer = null;
    const observer = new MutationObserver(() => {{
        observer.disconnect();
        clearTimeout(timer);
        resolve(true);
    }});
    observer.observe(root, {{ childList: true, subtree: true, attributes: true, characterData: true }});
    timer = setTimeout(() => {{ observer.disconnect(); resolve(false); }}, {ms});
}})"#,
        ms = window.as_millis()
    )
}

fn wait_for_resource_script(id: usize, cap: Duration) -> String {
    format!(
        r#"new Promise(resolve => {{
    const el = (window.__recorderPending || [])[{id}];
    if (!el || !el.isConnected) {{ resolve('loaded'); return; }}
    let done = false;
    const finish = (outcome) => {{
        if (done) return;
        done = true;
        el.removeEventListener('load', onLoad);
        el.removeEventListener('loadeddata', onLoad);
        el.removeEventListener('error', onError);
        resolve(outcome);
    }};
    const onLoad = () => finish('loaded');
    const onError = () => finish('failed');
    el.addEventListener('load', onLoad);
    el.addEventListener('loadeddata', onLoad);
    el.addEventListener('error', onError);
    if (el.tagName.toLowerCase() === 'img' && el.complete) finish(el.naturalHeight !== 0 ? 'loaded' : 'failed');
    if (el.tagName.toLowerCase() === 'video' && el.readyState >= 2) finish('loaded');
    setTimeout(() => finish('timedOut'), {ms});
}})"#,
        id = id,
        ms = cap.as_millis()
    )
}

fn loading_indicators_script(patterns_json: &str) -> String {
    format!(
        r#"(() => {{
    const patterns = {patterns};
    const fragments = patterns.classFragments.map(f => f.toLowerCase());
    const matches = (el) => {{
        for (const cls of el.classList) {{
            const lower = cls.toLowerCase();
            if (fragments.some(f => lower.includes(f))) return true;
        }}
        return patterns.attributes.some(([name, value]) => {{
            const actual = el.getAttribute(name);
            return actual !== null && actual.trim().toLowerCase() === value.toLowerCase();
        }});
    }};
    const visible = (el) => {{
        const style = getComputedStyle(el);
        if (style.display === 'none') return false;
        if (style.visibility === 'hidden' || style.visibility === 'collapse') return false;
        if (parseFloat(style.opacity) <= 0) return false;
        const rect = el.getBoundingClientRect();
        return rect.width > 0 && rect.height > 0;
    }};
    const describe = (el) => {{
        let out = el.tagName.toLowerCase();
        for (const cls of el.classList) out += '.' + cls;
        if (el.id) out += '#' + el.id;
        return out;
    }};
    return Array.from(document.querySelectorAll('*'))
        .filter(el => matches(el) && visible(el))
        .map(describe);
}})()"#,
        patterns = patterns_json
    )
}

/// [`ReadinessProbe`] that answers from inside a Chrome page
#[derive(Clone)]
pub struct ChromeProbe {
    page: Page,
}

impl ChromeProbe {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn target(&self) -> TargetHandle {
        handle_of(&self.page)
    }

    async fn evaluate_within<T: serde::de::DeserializeOwned>(
        &self,
        script: &str,
        limit: Duration,
    ) -> Result<Option<T>> {
        match tokio::time::timeout(limit + EVALUATE_GRACE, evaluate_typed(&self.page, script)).await
        {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }
}

#[async_trait]
impl ReadinessProbe for ChromeProbe {
    async fn wait_for_mutation(&self, window: Duration) -> Result<bool> {
        let mutated = self
            .evaluate_within::<bool>(&mutation_script(window), window)
            .await?;
        Ok(mutated.unwrap_or(false))
    }

    async fn pending_resources(&self) -> Result<Vec<PendingResource>> {
        evaluate_typed(&self.page, PENDING_RESOURCES_SCRIPT).await
    }

    async fn wait_for_resource(
        &self,
        resource: &PendingResource,
        cap: Duration,
    ) -> Result<ResourceOutcome> {
        let outcome = self
            .evaluate_within::<ResourceOutcome>(&wait_for_resource_script(resource.id, cap), cap)
            .await?;
        Ok(outcome.unwrap_or(ResourceOutcome::TimedOut))
    }

    async fn visible_loading_indicators(
        &self,
        patterns: &LoadingIndicatorPatterns,
    ) -> Result<Vec<String>> {
        let patterns = serde_json::to_string(patterns)
            .map_err(|e| RecorderError::Probe(format!("Invalid indicator patterns: {}", e)))?;
        evaluate_typed(&self.page, &loading_indicators_script(&patterns)).await
    }
}
