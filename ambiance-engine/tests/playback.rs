//! Playback properties, driven through the manual backend.

use ambiance_engine::{is_audible, EngineConfig, ManualBackend, PlaybackController, RecipeTable};
use approx::assert_abs_diff_eq;

const FOREST: &str = "forest-night";
const WINTER: &str = "winter-wind";
const FAN: &str = "desk-fan";
const FIRE: &str = "fireplace-crackle";

fn controller() -> PlaybackController<ManualBackend> {
    let cfg = EngineConfig { sample_rate: 4_000, loop_seconds: 1.0, seed: Some(42), ..EngineConfig::default() };
    let backend = ManualBackend::new(cfg.sample_rate);
    PlaybackController::new(backend, RecipeTable::builtin().unwrap(), cfg).unwrap()
}

fn advance(c: &mut PlaybackController<ManualBackend>, seconds: f64) {
    c.backend_mut().advance_seconds(seconds);
    c.poll();
}

fn active(c: &PlaybackController<ManualBackend>) -> Vec<String> {
    c.active_sound_ids().into_iter().collect()
}

#[test]
fn play_background_twice_keeps_one_channel() {
    let mut c = controller();
    c.play_background(FOREST);
    c.play_background(FOREST);
    assert_eq!(active(&c), vec![FOREST]);
    assert_eq!(c.current_background(), Some(FOREST));
    assert_eq!(c.pending_teardowns(), 0);
}

#[test]
fn background_fades_in_from_silence() {
    let mut c = controller();
    c.play_background(FOREST);
    assert_eq!(c.channel_gain(FOREST), Some(0.0));
    advance(&mut c, 1.0);
    assert_abs_diff_eq!(c.channel_gain(FOREST).unwrap(), 0.5, epsilon = 0.01);
    advance(&mut c, 1.5);
    assert_eq!(c.channel_gain(FOREST), Some(1.0));
}

#[test]
fn crossfade_swaps_backgrounds() {
    let mut c = controller();
    c.play_background(FOREST);
    advance(&mut c, 3.0);

    c.play_background(WINTER);
    assert_eq!(active(&c), vec![FOREST, WINTER]);
    assert_eq!(c.channel_gain(WINTER), Some(0.0));
    assert_abs_diff_eq!(c.channel_gain(FOREST).unwrap(), 1.0, epsilon = 1e-6);

    // midway both ramps sit at half, time-aligned
    advance(&mut c, 1.0);
    assert_abs_diff_eq!(c.channel_gain(FOREST).unwrap(), 0.5, epsilon = 0.01);
    assert_abs_diff_eq!(c.channel_gain(WINTER).unwrap(), 0.5, epsilon = 0.01);

    // crossfade (2.0 s) + margin (0.2 s) after the switch
    advance(&mut c, 1.25);
    assert_eq!(active(&c), vec![WINTER]);
    assert_eq!(c.channel_gain(WINTER), Some(1.0));
    assert_eq!(c.current_background(), Some(WINTER));
}

#[test]
fn old_background_survives_until_margin_elapses() {
    let mut c = controller();
    c.play_background(FOREST);
    advance(&mut c, 3.0);
    c.play_background(WINTER);
    advance(&mut c, 2.1);
    assert!(c.is_playing(FOREST));
    assert_abs_diff_eq!(c.channel_gain(FOREST).unwrap(), 0.0, epsilon = 1e-6);
    advance(&mut c, 0.2);
    assert!(!c.is_playing(FOREST));
}

#[test]
fn switching_back_mid_crossfade_reuses_the_fading_channel() {
    let mut c = controller();
    c.play_background(FOREST);
    advance(&mut c, 3.0);
    c.play_background(WINTER);
    advance(&mut c, 1.0);

    c.play_background(FOREST);
    assert_eq!(c.current_background(), Some(FOREST));
    let held = c.channel_gain(FOREST).unwrap();
    assert!(held > 0.4 && held < 0.6, "held={held}");

    advance(&mut c, 3.0);
    assert_eq!(active(&c), vec![FOREST]);
    assert_eq!(c.channel_gain(FOREST), Some(1.0));
}

#[test]
fn asset_and_background_are_independent() {
    let mut c = controller();
    c.play_background(FOREST);
    c.play_asset(FIRE);
    assert_eq!(active(&c), vec![FIRE, FOREST]);

    // assets start at full volume, no fade
    assert_eq!(c.channel_gain(FIRE), Some(1.0));

    c.stop_background();
    assert_eq!(c.current_background(), None);
    advance(&mut c, 2.5);
    assert_eq!(active(&c), vec![FIRE]);

    c.play_background(WINTER);
    c.stop_asset(FIRE);
    assert_eq!(active(&c), vec![WINTER]);
}

#[test]
fn assets_stack_and_replay_is_a_no_op() {
    let mut c = controller();
    c.play_asset(FIRE);
    c.play_asset(FAN);
    c.play_asset(FAN);
    assert_eq!(active(&c), vec![FAN, FIRE]);
    c.stop_asset(FAN);
    c.stop_asset(FAN);
    assert_eq!(active(&c), vec![FIRE]);
}

#[test]
fn channel_volume_survives_stop_and_replay() {
    let mut c = controller();
    c.play_asset(FAN);
    c.set_channel_volume(FAN, 0.3);
    c.stop_asset(FAN);
    assert!(!c.is_playing(FAN));

    c.play_asset(FAN);
    assert_eq!(c.channel_gain(FAN), Some(0.3));
    assert_eq!(c.channel_volume(FAN), 0.3);
}

#[test]
fn channel_volume_set_before_activation_is_remembered() {
    let mut c = controller();
    c.set_channel_volume(FAN, 0.25);
    c.play_asset(FAN);
    assert_eq!(c.channel_gain(FAN), Some(0.25));
}

#[test]
fn channel_volume_glides_on_a_live_channel() {
    let mut c = controller();
    c.play_asset(FAN);
    c.set_channel_volume(FAN, 0.3);
    advance(&mut c, 0.01);
    assert!(c.channel_gain(FAN).unwrap() > 0.5);
    advance(&mut c, 1.0);
    assert_abs_diff_eq!(c.channel_gain(FAN).unwrap(), 0.3, epsilon = 1e-3);
}

#[test]
fn background_fades_to_its_remembered_volume() {
    let mut c = controller();
    c.set_channel_volume(FOREST, 0.5);
    c.play_background(FOREST);
    advance(&mut c, 2.5);
    assert_eq!(c.channel_gain(FOREST), Some(0.5));
}

#[test]
fn volume_change_on_a_fading_channel_is_only_remembered() {
    let mut c = controller();
    c.play_background(FOREST);
    advance(&mut c, 3.0);
    c.play_background(WINTER);
    c.set_channel_volume(FOREST, 0.8);
    assert_eq!(c.channel_volume(FOREST), 0.8);
    advance(&mut c, 2.5);
    assert!(!c.is_playing(FOREST));
}

#[test]
fn unmute_restores_the_latest_master_volume() {
    let mut c = controller();
    c.play_asset(FAN);
    c.set_mute(true);
    c.set_master_volume(0.9);
    advance(&mut c, 2.0);
    assert!(c.is_muted());
    assert_abs_diff_eq!(c.master_gain().unwrap(), 0.0, epsilon = 1e-3);

    c.set_mute(false);
    advance(&mut c, 2.0);
    assert_eq!(c.master_volume(), 0.9);
    assert_abs_diff_eq!(c.master_gain().unwrap(), 0.9, epsilon = 1e-3);
}

#[test]
fn unknown_sound_is_a_silent_no_op() {
    let mut c = controller();
    c.play_asset("nonexistent-id");
    c.play_background("nonexistent-id");
    assert!(c.active_sound_ids().is_empty());
    assert!(!c.is_active());

    c.play_asset(FAN);
    let before = c.active_sound_ids();
    c.play_asset("nonexistent-id");
    assert_eq!(c.active_sound_ids(), before);
}

#[test]
fn denied_activation_is_retried_on_the_next_request() {
    let mut c = controller();
    c.backend_mut().set_deny_activation(true);
    c.play_asset(FAN);
    assert!(!c.is_active());
    assert!(c.active_sound_ids().is_empty());

    c.backend_mut().set_deny_activation(false);
    c.play_asset(FAN);
    assert!(c.is_active());
    assert_eq!(active(&c), vec![FAN]);
}

#[test]
fn suspended_engine_resumes_without_losing_channels() {
    let mut c = controller();
    c.play_asset(FAN);
    advance(&mut c, 0.5);
    c.suspend();
    assert!(!c.is_active());

    let t = c.current_time();
    advance(&mut c, 1.0);
    assert_eq!(c.current_time(), t);

    c.play_asset(FIRE);
    assert!(c.is_active());
    assert_eq!(active(&c), vec![FAN, FIRE]);
}

#[test]
fn meters_report_audible_sound() {
    let mut c = controller();
    assert_eq!(c.master_level(), 0.0);
    c.play_background(FOREST);
    advance(&mut c, 3.0);
    assert!(c.channel_level(FOREST) > 0.0);
    assert!(is_audible(c.master_level()), "master={}", c.master_level());
    assert!(c.master_level() <= 1.0);
    assert_eq!(c.channel_level(FAN), 0.0);

    c.stop_asset(FOREST);
    assert_eq!(c.channel_level(FOREST), 0.0);
    assert_eq!(c.current_background(), None);
}

#[test]
fn stop_background_without_one_is_a_no_op() {
    let mut c = controller();
    c.play_asset(FAN);
    c.stop_background();
    assert_eq!(active(&c), vec![FAN]);
    assert_eq!(c.pending_teardowns(), 0);
}
