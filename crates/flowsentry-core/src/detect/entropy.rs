//! Shannon-entropy-deficit detector.
//!
//! Volumetric attacks concentrate traffic onto few sources, destinations or
//! flow signatures, which collapses the entropy of those token sequences.
//! The anomaly score is the mean deficit `1 - H_norm` over five categorical
//! features; all state lives on the stack for the call.

use std::collections::HashMap;

use super::strict_majority;
use crate::{FlowWindow, WindowResult};

/// Normalised Shannon entropy of a token sequence, in `[0, 1]`.
///
/// A constant sequence (one distinct token) has entropy 0 by definition.
fn normalized_entropy<T: AsRef<str>>(tokens: &[T]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let mut frequencies: HashMap<&str, usize> = HashMap::new();
    for token in tokens {
        *frequencies.entry(token.as_ref()).or_insert(0) += 1;
    }
    let distinct = frequencies.len();
    if distinct <= 1 {
        return 0.0;
    }

    let total = tokens.len() as f64;
    let entropy: f64 = frequencies
        .values()
        .map(|&n| {
            let p = n as f64 / total;
            -p * p.log2()
        })
        .sum();
    entropy / (distinct as f64).log2()
}

/// Analyses one window; flows with an empty source or destination address
/// are excluded. On an alarm every counted source address is appended to
/// the suspect list with multiplicity.
pub fn detect_window(window: &FlowWindow, threshold: f64) -> WindowResult {
    let mut result = WindowResult::for_window(window);
    if window.flows.is_empty() {
        return result;
    }

    let mut src_addrs: Vec<&str> = Vec::with_capacity(window.flow_count());
    let mut dst_addrs: Vec<&str> = Vec::with_capacity(window.flow_count());
    let mut src_ports: Vec<String> = Vec::with_capacity(window.flow_count());
    let mut dst_ports: Vec<String> = Vec::with_capacity(window.flow_count());
    let mut signatures: Vec<String> = Vec::with_capacity(window.flow_count());
    let mut attacks = 0usize;

    for flow in &window.flows {
        if flow.src_addr.is_empty() || flow.dst_addr.is_empty() {
            continue;
        }
        src_addrs.push(&flow.src_addr);
        dst_addrs.push(&flow.dst_addr);
        src_ports.push(flow.src_port.to_string());
        dst_ports.push(flow.dst_port.to_string());
        signatures.push(format!(
            "{}|{}|{}|{}",
            flow.src_addr, flow.dst_addr, flow.src_port, flow.dst_port
        ));
        if flow.is_attack {
            attacks += 1;
        }
    }
    if src_addrs.is_empty() {
        return result;
    }

    let entropies = [
        normalized_entropy(&src_addrs),
        normalized_entropy(&dst_addrs),
        normalized_entropy(&src_ports),
        normalized_entropy(&dst_ports),
        normalized_entropy(&signatures),
    ];
    result.norm_entropy_src = entropies[0];
    result.norm_entropy_dst = entropies[1];
    result.entropy_score =
        entropies.iter().map(|h| 1.0 - h).sum::<f64>() / entropies.len() as f64;
    result.entropy_pred = result.entropy_score > threshold;
    result.ground_truth = strict_majority(attacks, src_addrs.len());

    if result.entropy_pred {
        for addr in &src_addrs {
            result.suspects.add(addr);
        }
    }

    result
}
