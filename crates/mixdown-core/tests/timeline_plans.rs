use std::{collections::BTreeMap, path::PathBuf};

use mixdown_core::{
    AssetRole, MixParameters, TimelineInputs, build_plan, compile,
    fixtures::{podcast_inputs, podcast_request},
    graph::{MixDuration, Op},
};

fn dummy_sources() -> BTreeMap<AssetRole, PathBuf> {
    AssetRole::ALL
        .into_iter()
        .map(|role| (role, PathBuf::from(format!("/scratch/{role}.wav"))))
        .collect()
}

fn mix_ops(graph: &mixdown_core::PlanGraph) -> Vec<Op> {
    graph
        .nodes()
        .iter()
        .filter(|node| node.op.name() == "mix")
        .map(|node| node.op)
        .collect()
}

#[test]
fn ducked_bed_with_loudnorm_plans_full_body_chain() {
    let params = MixParameters::default();
    let inputs = TimelineInputs::voice_only(60.0).with_bed();
    let plan = build_plan(&params, &inputs);
    let graph = &plan.graph;

    assert_eq!(graph.count_ops("loop"), 1);
    assert_eq!(graph.count_ops("volume"), 1);
    assert_eq!(graph.count_ops("sidechain_duck"), 1);
    assert_eq!(graph.count_ops("normalize"), 1);
    assert_eq!(graph.count_ops("crossfade"), 0);
    assert_eq!(graph.count_ops("concat"), 0);

    let mix = graph
        .nodes()
        .iter()
        .find(|node| node.op.name() == "mix")
        .expect("bed should be mixed with voice");
    assert!(matches!(
        mix.op,
        Op::Mix {
            duration: MixDuration::First,
            ..
        }
    ));
    assert!((plan.expected_duration_seconds() - 60.0).abs() < 1e-9);
    assert_eq!(graph.validate(), Ok(()));
}

#[test]
fn body_only_plan_skips_junction_logic() {
    let params = MixParameters {
        duck: false,
        crossfade_seconds: 2.0,
        carry_over_seconds: 3.0,
        ..MixParameters::default()
    };
    let inputs = TimelineInputs::voice_only(45.0).with_bed();
    let plan = build_plan(&params, &inputs);

    assert!(plan.shape.is_body_only());
    assert!(!plan.shape.carry_over);
    for op in ["crossfade", "concat", "split", "trim", "sidechain_duck", "format"] {
        assert_eq!(plan.graph.count_ops(op), 0, "{op} should not appear");
    }
    assert_eq!(plan.graph.count_ops("mix"), 1);
    assert_eq!(plan.effective.carry_over_seconds, 0.0);
}

#[test]
fn podcast_plan_mixes_intro_tail_under_voice_head() {
    let request = podcast_request();
    let plan = build_plan(&request.params, &podcast_inputs());
    let effective = &plan.effective;

    let intro = effective.intro.expect("intro should survive clamping");
    assert!((intro.window_seconds - 12.0).abs() < 1e-9);
    assert!((effective.carry_over_seconds - 4.0).abs() < 1e-9);
    assert!((effective.intro_crossfade_seconds - 1.5).abs() < 1e-9);
    assert!((effective.outro_crossfade_seconds - 1.5).abs() < 1e-9);
    assert!(plan.shape.carry_over);

    let graph = &plan.graph;
    // Ducking key plus the head/remainder split of the body.
    assert_eq!(graph.count_ops("split"), 2);
    // Body mix plus the head/tail mix.
    assert_eq!(graph.count_ops("mix"), 2);
    // Intro clip, intro tail, head, remainder, outro clip.
    assert_eq!(graph.count_ops("trim"), 5);
    assert_eq!(graph.count_ops("crossfade"), 2);
    assert_eq!(graph.count_ops("concat"), 1);
    assert_eq!(graph.validate(), Ok(()));

    let head_mix = graph
        .nodes()
        .iter()
        .find(|node| {
            matches!(
                node.op,
                Op::Mix {
                    duration: MixDuration::Shortest,
                    ..
                }
            )
        })
        .expect("carry-over should mix head and tail");
    assert_eq!(head_mix.inputs.len(), 2);
    assert!(matches!(head_mix.op, Op::Mix { normalize: false, .. }));
    assert!(matches!(mix_ops(graph)[0], Op::Mix { normalize: true, .. }));

    let expected = 300.0 + (12.0 - 1.5) + (8.0 - 1.5);
    assert!((plan.expected_duration_seconds() - expected).abs() < 1e-9);
}

#[test]
fn degenerate_carry_over_falls_back_to_plain_join() {
    let params = MixParameters {
        carry_over_seconds: 4.0,
        ..MixParameters::default()
    };
    let inputs = TimelineInputs::voice_only(0.04).with_intro(10.0);
    let plan = build_plan(&params, &inputs);

    assert_eq!(plan.effective.carry_over_seconds, 0.0);
    assert!(!plan.shape.carry_over);
    assert_eq!(plan.graph.count_ops("split"), 0);
    assert_eq!(plan.graph.count_ops("concat"), 1);
    assert_eq!(plan.graph.validate(), Ok(()));
}

#[test]
fn sub_millisecond_requests_emit_no_zero_length_filters() {
    let params = MixParameters {
        carry_over_seconds: 0.0004,
        crossfade_seconds: 0.0004,
        intro_fade_in_seconds: 0.0004,
        intro_fade_out_seconds: 0.0004,
        ..MixParameters::default()
    };
    let inputs = TimelineInputs::voice_only(60.0).with_bed().with_intro(10.0);
    let plan = build_plan(&params, &inputs);

    assert!(!plan.shape.carry_over);
    assert_eq!(plan.graph.count_ops("fade"), 0);
    assert_eq!(plan.graph.count_ops("crossfade"), 0);
    assert_eq!(plan.graph.count_ops("concat"), 1);

    let program = compile(&plan.graph, &dummy_sources()).expect("plan should compile");
    for filter in program.filter_graph.split([',', ';', '[']) {
        assert!(!filter.ends_with("d=0"), "zero-length filter: {filter}");
        assert!(!filter.ends_with("end=0"), "empty trim: {filter}");
    }
}

#[test]
fn empty_intro_is_dropped_from_timeline() {
    let params = MixParameters::default();
    let inputs = TimelineInputs::voice_only(30.0)
        .with_bed()
        .with_intro(0.0)
        .with_outro(5.0);
    let plan = build_plan(&params, &inputs);

    assert!(!plan.shape.has_intro);
    assert!(plan.shape.has_outro);
    assert_eq!(
        plan.graph.sources(),
        vec![AssetRole::Voice, AssetRole::Bed, AssetRole::Outro]
    );
    assert!(
        plan.segments
            .iter()
            .all(|segment| segment.role != AssetRole::Intro)
    );
}

#[test]
fn identical_inputs_build_identical_plans() {
    let request = podcast_request();
    let first = build_plan(&request.params, &podcast_inputs());
    let second = build_plan(&request.params, &podcast_inputs());

    assert_eq!(first, second);
    assert_eq!(first.fingerprint(), second.fingerprint());

    let other = build_plan(&request.params, &podcast_inputs().with_outro(9.0));
    assert_ne!(first.fingerprint(), other.fingerprint());
}

#[test]
fn every_timeline_shape_validates_and_compiles() {
    let sources = dummy_sources();
    for has_bed in [false, true] {
        for intro in [None, Some(9.0)] {
            for outro in [None, Some(7.0)] {
                for duck in [false, true] {
                    for loudnorm in [false, true] {
                        for (crossfade, carry) in [(0.0, 0.0), (1.0, 0.0), (0.0, 2.0), (1.0, 2.0)]
                        {
                            let params = MixParameters {
                                duck,
                                loudnorm,
                                crossfade_seconds: crossfade,
                                carry_over_seconds: carry,
                                intro_fade_in_seconds: 0.5,
                                outro_fade_out_seconds: 1.0,
                                ..MixParameters::default()
                            };
                            let inputs = TimelineInputs {
                                voice_seconds: 40.0,
                                has_bed,
                                intro_seconds: intro,
                                outro_seconds: outro,
                            };
                            let plan = build_plan(&params, &inputs);
                            let shape = plan.shape;

                            plan.graph.validate().unwrap_or_else(|error| {
                                panic!("{shape:?} should validate: {error}")
                            });
                            let program = compile(&plan.graph, &sources).unwrap_or_else(|error| {
                                panic!("{shape:?} should compile: {error}")
                            });
                            assert_eq!(program.inputs[0].0, AssetRole::Voice);
                            assert_eq!(
                                plan.graph.count_ops("normalize"),
                                usize::from(loudnorm)
                            );
                            assert_eq!(
                                plan.graph.count_ops("sidechain_duck"),
                                usize::from(duck && has_bed)
                            );
                        }
                    }
                }
            }
        }
    }
}
