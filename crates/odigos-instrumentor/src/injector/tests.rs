use k8s_openapi::api::core::v1::{EnvVarSource, ObjectFieldSelector};

use super::*;
use crate::api::EnvVar as RuntimeEnvVar;
use crate::workload::WorkloadKind;

const USER_NODE_OPTIONS: &str = "--max-old-space-size=4096";
const NODE_AGENT: &str = "--require /var/odigos/nodejs/autoinstrumentation.js";
const NODE_EBPF_AGENT: &str = "--require /var/odigos/nodejs-ebpf/autoinstrumentation.js";
const JAVA_AGENT: &str = "-javaagent:/var/odigos/java/javaagent.jar";
const PYTHON_AGENT: &str =
    "/var/odigos/python:/var/odigos/python/opentelemetry/instrumentation/auto_instrumentation";

fn injector() -> EnvInjector {
    EnvInjector::new(Arc::new(Registry::builtin()), InjectorConfig::default())
}

fn pod_workload() -> PodWorkload {
    PodWorkload {
        name: "frontend".to_string(),
        namespace: "default".to_string(),
        kind: WorkloadKind::Deployment,
    }
}

fn plain_env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}

fn container(env: &[(&str, &str)]) -> Container {
    Container {
        name: "app".to_string(),
        env: (!env.is_empty())
            .then(|| env.iter().map(|(name, value)| plain_env(name, value)).collect()),
        ..Default::default()
    }
}

fn details(
    language: ProgrammingLanguage,
    state: Option<ProcessingState>,
    runtime_env: &[(&str, &str)],
) -> RuntimeDetailsByContainer {
    RuntimeDetailsByContainer {
        container_name: "app".to_string(),
        language,
        env_from_container_runtime: runtime_env
            .iter()
            .map(|(name, value)| RuntimeEnvVar::new(*name, *value))
            .collect(),
        runtime_update_state: state,
        ..Default::default()
    }
}

fn env_value<'a>(container: &'a Container, name: &str) -> Option<&'a str> {
    find_env(container, name).and_then(|env| env.value.as_deref())
}

fn env_names(container: &Container) -> Vec<&str> {
    container
        .env
        .iter()
        .flatten()
        .map(|env| env.name.as_str())
        .collect()
}

#[test]
fn test_unsupported_language_is_left_alone() {
    let injector = injector();
    let mut c = container(&[("FOO", "bar")]);
    let original = c.clone();

    let snapshot = injector.inject_odigos_agent_env_vars(
        &pod_workload(),
        &mut c,
        OtelSdk::EBPF_ENTERPRISE,
        &details(ProgrammingLanguage::Go, Some(ProcessingState::Succeeded), &[]),
        None,
    );

    assert_eq!(c, original);
    assert!(snapshot.is_empty());
}

#[test]
fn test_failed_inspection_gets_no_env() {
    let injector = injector();
    let mut runtime_details = details(
        ProgrammingLanguage::Javascript,
        Some(ProcessingState::Failed),
        &[("NODE_OPTIONS", USER_NODE_OPTIONS)],
    );
    runtime_details.cri_error_message = Some("container not found".to_string());

    let mut c = container(&[]);
    let snapshot = injector.inject_odigos_agent_env_vars(
        &pod_workload(),
        &mut c,
        OtelSdk::NATIVE_COMMUNITY,
        &runtime_details,
        None,
    );

    assert_eq!(c.env, None);
    assert!(snapshot.is_empty());
}

#[test]
fn test_unset_state_gets_no_env() {
    let injector = injector();
    let mut c = container(&[("FOO", "bar")]);
    let original = c.clone();

    injector.inject_odigos_agent_env_vars(
        &pod_workload(),
        &mut c,
        OtelSdk::NATIVE_COMMUNITY,
        &details(ProgrammingLanguage::Python, None, &[("PYTHONPATH", "/app")]),
        None,
    );

    assert_eq!(c, original);
}

#[test]
fn test_defaults_when_nothing_declared() {
    let injector = injector();
    let mut c = container(&[]);

    let snapshot = injector.inject_odigos_agent_env_vars(
        &pod_workload(),
        &mut c,
        OtelSdk::NATIVE_COMMUNITY,
        &details(ProgrammingLanguage::Javascript, Some(ProcessingState::Succeeded), &[]),
        None,
    );

    assert_eq!(env_value(&c, "NODE_OPTIONS"), Some(NODE_AGENT));
    assert_eq!(
        snapshot,
        ContainerOriginalEnv::from([("NODE_OPTIONS".to_string(), None)])
    );
}

#[test]
fn test_java_defaults_respect_avoid_java_opts() {
    let rd = details(ProgrammingLanguage::Java, Some(ProcessingState::Skipped), &[]);

    let mut c = container(&[]);
    injector().inject_odigos_agent_env_vars(&pod_workload(), &mut c, OtelSdk::NATIVE_COMMUNITY, &rd, None);
    assert_eq!(env_names(&c), ["JAVA_OPTS", "JAVA_TOOL_OPTIONS"]);
    assert_eq!(env_value(&c, "JAVA_OPTS"), Some(JAVA_AGENT));
    assert_eq!(env_value(&c, "JAVA_TOOL_OPTIONS"), Some(JAVA_AGENT));

    let injector = EnvInjector::new(
        Arc::new(Registry::builtin()),
        InjectorConfig {
            avoid_injecting_java_opts: true,
        },
    );
    let mut c = container(&[]);
    injector.inject_odigos_agent_env_vars(&pod_workload(), &mut c, OtelSdk::NATIVE_COMMUNITY, &rd, None);
    assert_eq!(env_names(&c), ["JAVA_TOOL_OPTIONS"]);
}

#[test]
fn test_manifest_value_is_patched_in_place() {
    let injector = injector();
    let mut c = container(&[
        ("FOO", "bar"),
        ("NODE_OPTIONS", USER_NODE_OPTIONS),
        ("ZED", "last"),
    ]);

    let snapshot = injector.inject_odigos_agent_env_vars(
        &pod_workload(),
        &mut c,
        OtelSdk::NATIVE_COMMUNITY,
        &details(ProgrammingLanguage::Javascript, Some(ProcessingState::Skipped), &[]),
        None,
    );

    assert_eq!(env_names(&c), ["FOO", "NODE_OPTIONS", "ZED"]);
    assert_eq!(
        env_value(&c, "NODE_OPTIONS"),
        Some(format!("{USER_NODE_OPTIONS} {NODE_AGENT}").as_str())
    );
    assert_eq!(
        snapshot,
        ContainerOriginalEnv::from([(
            "NODE_OPTIONS".to_string(),
            Some(USER_NODE_OPTIONS.to_string())
        )])
    );
}

#[test]
fn test_marker_value_is_left_byte_for_byte() {
    let injector = injector();
    let already = format!("{USER_NODE_OPTIONS}  {NODE_EBPF_AGENT}");
    let mut c = container(&[("NODE_OPTIONS", already.as_str())]);
    let original = c.clone();

    let snapshot = injector.inject_odigos_agent_env_vars(
        &pod_workload(),
        &mut c,
        OtelSdk::NATIVE_COMMUNITY,
        &details(ProgrammingLanguage::Javascript, Some(ProcessingState::Succeeded), &[]),
        None,
    );

    assert_eq!(c, original);
    assert!(snapshot.is_empty());
}

#[test]
fn test_webhook_retry_is_a_noop() {
    let injector = injector();
    let rd = details(
        ProgrammingLanguage::Java,
        Some(ProcessingState::Succeeded),
        &[("JAVA_TOOL_OPTIONS", "-Xmx1g")],
    );

    let mut c = container(&[]);
    injector.inject_odigos_agent_env_vars(&pod_workload(), &mut c, OtelSdk::NATIVE_COMMUNITY, &rd, None);
    let first = c.clone();

    let snapshot =
        injector.inject_odigos_agent_env_vars(&pod_workload(), &mut c, OtelSdk::NATIVE_COMMUNITY, &rd, None);

    assert_eq!(c, first);
    assert!(snapshot.is_empty());
}

#[test]
fn test_runtime_value_is_composed() {
    let injector = injector();
    let mut c = container(&[("FOO", "bar")]);

    let snapshot = injector.inject_odigos_agent_env_vars(
        &pod_workload(),
        &mut c,
        OtelSdk::NATIVE_COMMUNITY,
        &details(
            ProgrammingLanguage::Java,
            Some(ProcessingState::Succeeded),
            &[("JAVA_TOOL_OPTIONS", "-Xmx1g")],
        ),
        None,
    );

    // the image only sets JAVA_TOOL_OPTIONS, JAVA_OPTS must not load a second agent
    assert_eq!(env_names(&c), ["FOO", "JAVA_TOOL_OPTIONS"]);
    assert_eq!(
        env_value(&c, "JAVA_TOOL_OPTIONS"),
        Some(format!("-Xmx1g {JAVA_AGENT}").as_str())
    );
    assert_eq!(
        snapshot,
        ContainerOriginalEnv::from([("JAVA_TOOL_OPTIONS".to_string(), None)])
    );
}

#[test]
fn test_runtime_value_with_other_sdk_is_replaced() {
    let injector = injector();
    let mut c = container(&[]);

    injector.inject_odigos_agent_env_vars(
        &pod_workload(),
        &mut c,
        OtelSdk::EBPF_ENTERPRISE,
        &details(
            ProgrammingLanguage::Javascript,
            Some(ProcessingState::Succeeded),
            &[("NODE_OPTIONS", format!("{USER_NODE_OPTIONS} {NODE_AGENT}").as_str())],
        ),
        None,
    );

    assert_eq!(
        env_value(&c, "NODE_OPTIONS"),
        Some(format!("{USER_NODE_OPTIONS} {NODE_EBPF_AGENT}").as_str())
    );
}

#[test]
fn test_empty_runtime_value_is_treated_as_absent() {
    let injector = injector();
    let mut c = container(&[]);

    injector.inject_odigos_agent_env_vars(
        &pod_workload(),
        &mut c,
        OtelSdk::NATIVE_COMMUNITY,
        &details(
            ProgrammingLanguage::Python,
            Some(ProcessingState::Succeeded),
            &[("PYTHONPATH", "")],
        ),
        None,
    );

    assert_eq!(env_value(&c, "PYTHONPATH"), Some(PYTHON_AGENT));
}

#[test]
fn test_declared_empty_value_is_filled_in_place() {
    let injector = injector();
    let mut c = container(&[("PYTHONPATH", ""), ("FOO", "bar")]);

    let snapshot = injector.inject_odigos_agent_env_vars(
        &pod_workload(),
        &mut c,
        OtelSdk::NATIVE_COMMUNITY,
        &details(
            ProgrammingLanguage::Python,
            Some(ProcessingState::Succeeded),
            &[("PYTHONPATH", "/app")],
        ),
        None,
    );

    assert_eq!(env_names(&c), ["PYTHONPATH", "FOO"]);
    assert_eq!(
        env_value(&c, "PYTHONPATH"),
        Some(format!("/app:{PYTHON_AGENT}").as_str())
    );
    assert_eq!(
        snapshot,
        ContainerOriginalEnv::from([("PYTHONPATH".to_string(), None)])
    );
}

#[test]
fn test_value_from_is_renamed_and_referenced() {
    let injector = injector();
    let mut c = container(&[]);
    c.env = Some(vec![EnvVar {
        name: "NODE_OPTIONS".to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: "metadata.annotations['node-options']".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
    }]);

    let snapshot = injector.inject_odigos_agent_env_vars(
        &pod_workload(),
        &mut c,
        OtelSdk::NATIVE_COMMUNITY,
        &details(ProgrammingLanguage::Javascript, None, &[]),
        None,
    );

    assert_eq!(env_names(&c), ["ORIGINAL_NODE_OPTIONS", "NODE_OPTIONS"]);
    assert!(find_env(&c, "ORIGINAL_NODE_OPTIONS").unwrap().value_from.is_some());
    assert_eq!(
        env_value(&c, "NODE_OPTIONS"),
        Some(format!("$(ORIGINAL_NODE_OPTIONS) {NODE_AGENT}").as_str())
    );
    assert!(snapshot.is_empty());

    // a retry sees the composed plain value and leaves it alone
    let first = c.clone();
    injector.inject_odigos_agent_env_vars(
        &pod_workload(),
        &mut c,
        OtelSdk::NATIVE_COMMUNITY,
        &details(ProgrammingLanguage::Javascript, None, &[]),
        None,
    );
    assert_eq!(c, first);
}

#[test]
fn test_signal_exporters_for_native_java() {
    let injector = injector();
    let mut c = container(&[(OTEL_TRACES_EXPORTER, "zipkin")]);

    injector.inject_odigos_agent_env_vars(
        &pod_workload(),
        &mut c,
        OtelSdk::NATIVE_COMMUNITY,
        &details(ProgrammingLanguage::Java, Some(ProcessingState::Succeeded), &[]),
        Some(&[ObservabilitySignal::Traces, ObservabilitySignal::Metrics]),
    );

    assert_eq!(env_value(&c, OTEL_TRACES_EXPORTER), Some("zipkin"));
    assert_eq!(env_value(&c, OTEL_METRICS_EXPORTER), Some("otlp"));
    assert_eq!(env_value(&c, OTEL_LOGS_EXPORTER), Some("none"));
}

#[test]
fn test_no_signal_exporters_for_other_sdks() {
    let injector = injector();
    let signals = [ObservabilitySignal::Traces];

    let mut c = container(&[]);
    injector.inject_odigos_agent_env_vars(
        &pod_workload(),
        &mut c,
        OtelSdk::EBPF_ENTERPRISE,
        &details(ProgrammingLanguage::Java, Some(ProcessingState::Succeeded), &[]),
        Some(&signals),
    );
    assert!(find_env(&c, OTEL_TRACES_EXPORTER).is_none());

    let mut c = container(&[]);
    injector.inject_odigos_agent_env_vars(
        &pod_workload(),
        &mut c,
        OtelSdk::NATIVE_COMMUNITY,
        &details(ProgrammingLanguage::Python, Some(ProcessingState::Succeeded), &[]),
        Some(&signals),
    );
    assert!(find_env(&c, OTEL_TRACES_EXPORTER).is_none());
}

#[test]
fn test_should_inject() {
    let mut rd = details(ProgrammingLanguage::Java, None, &[]);
    assert!(!should_inject(&rd, "app"));

    rd.runtime_update_state = Some(ProcessingState::Failed);
    assert!(!should_inject(&rd, "app"));

    for state in [ProcessingState::Succeeded, ProcessingState::Skipped] {
        rd.runtime_update_state = Some(state);
        assert!(should_inject(&rd, "app"));
    }
}
