use level::{FF_FULLBRIGHT, MapObjFlag, Patch, PspState};
use math::FRACUNIT;
use render_trait::{PixelBuffer, PlayViewRenderer, ScreenBuffer};

use super::{
    SPRITE_COLOUR, WEAPON_COLOUR, add_thing, frame_pixels, render_frame, renderer, room, serial,
    window_rooms,
};
use crate::RenderConfig;

fn count_colour(buffer: &ScreenBuffer, colour: u8) -> usize {
    buffer.buf().iter().filter(|c| **c == colour).count()
}

#[test]
fn thing_ahead_is_drawn_at_centre() {
    let mut scene = room();
    add_thing(&mut scene.level, 256, 256, 25);
    let mut r = renderer(320, 200, serial());
    let mut buffer = ScreenBuffer::new(320, 200);
    render_frame(&mut r, &scene, &mut buffer);

    assert_eq!(r.vissprite_scales().len(), 1);
    assert_eq!(buffer.read_pixel(160, 100), SPRITE_COLOUR);
    // Beside it the wall shows
    assert_ne!(buffer.read_pixel(140, 100), SPRITE_COLOUR);
}

#[test]
fn view_player_and_things_behind_are_skipped() {
    let mut scene = room();
    add_thing(&mut scene.level, 256, 20, 0);
    let mut r = renderer(320, 200, serial());
    let mut buffer = ScreenBuffer::new(320, 200);
    render_frame(&mut r, &scene, &mut buffer);
    assert!(r.vissprite_scales().is_empty());
    assert_eq!(count_colour(&buffer, SPRITE_COLOUR), 0);
}

#[test]
fn sprites_sort_nearest_first() {
    let mut scene = room();
    for (i, y) in [300, 120, 480, 200, 160, 400, 260, 350].iter().enumerate() {
        for x in [200, 256, 312] {
            add_thing(&mut scene.level, x + i as i32, *y, 0);
        }
    }
    let mut r = renderer(320, 200, serial());
    let mut buffer = ScreenBuffer::new(320, 200);
    render_frame(&mut r, &scene, &mut buffer);

    let scales = r.vissprite_scales();
    assert!(scales.len() >= 16, "merge path needs a longer run");
    assert!(scales.windows(2).all(|w| w[0] >= w[1]));

    let order = r.vissprite_order.clone();
    r.sort_vis_sprites();
    let resorted: Vec<_> = r.vissprite_order.iter().map(|i| r.vissprites[*i].scale).collect();
    assert_eq!(resorted, scales);
    assert_eq!(order, r.vissprite_order);
}

#[test]
fn walls_hide_things_behind_them() {
    let mut scene = window_rooms();
    // In the far room, well to the side of the window
    add_thing(&mut scene.level, 64, 400, 24);
    let mut r = renderer(320, 200, serial());
    let mut buffer = ScreenBuffer::new(320, 200);
    render_frame(&mut r, &scene, &mut buffer);
    assert_eq!(count_colour(&buffer, SPRITE_COLOUR), 0);

    // Seen through the window it shows
    let mut scene = window_rooms();
    add_thing(&mut scene.level, 256, 400, 24);
    render_frame(&mut r, &scene, &mut buffer);
    assert!(count_colour(&buffer, SPRITE_COLOUR) > 0);
}

#[test]
fn translucent_and_shadow_things_blend() {
    let mut scene = room();
    let t = add_thing(&mut scene.level, 240, 256, 25);
    scene.level.things[t].flags |= MapObjFlag::SHADOW;
    let t = add_thing(&mut scene.level, 272, 256, 25);
    scene.level.things[t].flags |= MapObjFlag::TRANSLUCENT;
    let mut r = renderer(320, 200, serial());
    let mut buffer = ScreenBuffer::new(320, 200);
    render_frame(&mut r, &scene, &mut buffer);
    assert_eq!(r.vissprite_scales().len(), 2);
    // Neither is drawn as plain sprite colour
    assert_eq!(count_colour(&buffer, SPRITE_COLOUR), 0);
}

#[test]
fn masked_middle_texture_shows_through() {
    let mut scene = window_rooms();
    let rows: Vec<Option<u8>> = (0..64 * 128)
        .map(|i| ((i / 64) % 2 == 0).then_some(60))
        .collect();
    let grate = scene.pic_data.add_wall(Patch::from_pixels("GRATE", 64, 128, 0, 0, &rows));
    let window = scene
        .level
        .map_data
        .linedefs
        .iter()
        .position(|l| l.backsector.is_some())
        .unwrap();
    for side in scene.level.map_data.linedefs[window].sidenum.into_iter().flatten() {
        scene.level.map_data.sidedefs[side].midtexture = grate;
    }

    let mut r = renderer(320, 200, serial());
    let mut buffer = ScreenBuffer::new(320, 200);
    render_frame(&mut r, &scene, &mut buffer);
    assert!(r.r_data.drawsegs.iter().any(|ds| ds.maskedtexturecol.is_some()));
    assert!((0..200).any(|y| buffer.read_pixel(160, y) == 60));
}

#[test]
fn weapon_draws_over_the_view() {
    let mut scene = room();
    scene.player.psprites[0].state = Some(PspState {
        sprite: 1,
        frame: FF_FULLBRIGHT,
    });
    scene.player.psprites[0].sx = 160 * FRACUNIT;
    scene.player.psprites[0].sy = 100 * FRACUNIT;
    let mut r = renderer(320, 200, serial());
    let mut buffer = ScreenBuffer::new(320, 200);
    render_frame(&mut r, &scene, &mut buffer);
    assert_eq!(buffer.read_pixel(160, 90), WEAPON_COLOUR);
    // Above the top of the patch
    assert_ne!(buffer.read_pixel(160, 60), WEAPON_COLOUR);

    // Invisible players get a fuzzed weapon
    scene.player.invisibility = 1000;
    render_frame(&mut r, &scene, &mut buffer);
    assert_ne!(buffer.read_pixel(160, 90), WEAPON_COLOUR);
}

#[test]
fn resolution_reset_is_idempotent() {
    let mut scene = window_rooms();
    add_thing(&mut scene.level, 256, 400, 24);
    let mut r = renderer(320, 200, serial());
    let first = frame_pixels(&mut r, &scene);

    r.reset_resolution_dependent_buffers(320, 200);
    let once = frame_pixels(&mut r, &scene);
    r.reset_resolution_dependent_buffers(320, 200);
    r.reset_resolution_dependent_buffers(320, 200);
    let twice = frame_pixels(&mut r, &scene);
    assert_eq!(first, once);
    assert_eq!(once, twice);

    // Through another size and back
    r.reset_resolution_dependent_buffers(640, 400);
    assert_eq!(frame_pixels(&mut r, &scene).len(), 640 * 400);
    r.reset_resolution_dependent_buffers(320, 200);
    assert_eq!(frame_pixels(&mut r, &scene), first);
}

#[test]
fn parallel_and_serial_frames_match() {
    let mut scene = window_rooms();
    add_thing(&mut scene.level, 256, 400, 24);
    add_thing(&mut scene.level, 220, 180, 0);

    let mut serial_r = renderer(320, 200, serial());
    let expected = frame_pixels(&mut serial_r, &scene);

    let mut parallel = renderer(
        320,
        200,
        RenderConfig {
            threads: 4,
            parallel_sky: true,
            parallel_spans: true,
        },
    );
    for _ in 0..3 {
        assert_eq!(frame_pixels(&mut parallel, &scene), expected);
    }

    // Switching the spans back to the main thread changes nothing
    parallel.set_parallel(true, false);
    assert_eq!(frame_pixels(&mut parallel, &scene), expected);
}

#[test]
fn interpolated_things_sit_between_ticks() {
    let mut scene = room();
    let t = add_thing(&mut scene.level, 200, 256, 25);
    scene.level.move_thing(t, 312 << 16, 256 << 16, 25 << 16);
    scene.level.tic_frac = FRACUNIT / 2;

    let mut r = renderer(320, 200, serial());
    let mut buffer = ScreenBuffer::new(320, 200);
    render_frame(&mut r, &scene, &mut buffer);
    assert_eq!(buffer.read_pixel(160, 100), SPRITE_COLOUR);
}
