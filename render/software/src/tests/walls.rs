use level::{Level, LineDefFlags, MapBuilder, Segment, SideDef};
use render_trait::ScreenBuffer;

use super::{
    Scene, open_sector, pic_data, render_frame, renderer, room, serial, spawn_player, window_rooms,
};
use crate::SoftwareRenderer;
use crate::bsp::clip_wall_segment;
use crate::defs::{PLANE_UNUSED, Visplane};

fn seg_of_line(segs: &[Segment], line: usize) -> Vec<usize> {
    segs.iter()
        .enumerate()
        .filter(|(_, s)| s.linedef == Some(line))
        .map(|(i, _)| i)
        .collect()
}

#[test]
fn solid_columns_never_reopen() {
    let mut solidcol = vec![0u8; 320];
    // Small LCG so the sequence is fixed
    let mut seed = 0x1234_5678u32;
    let mut next = |n: u32| {
        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (seed >> 8) % n
    };
    for _ in 0..500 {
        let first = next(320) as i32;
        let last = (first + 1 + next(80) as i32).min(320);
        let solid = next(3) != 0;
        let before = solidcol.clone();
        let mut stored = Vec::new();
        clip_wall_segment(&mut solidcol, first, last, solid, |a, b| stored.push((a, b)));

        for x in 0..320 {
            assert!(before[x] == 0 || solidcol[x] != 0, "column {x} reopened");
        }
        // Stored runs were all open beforehand
        for (a, b) in stored {
            assert!(a <= b);
            assert!((a..=b).all(|x| before[x as usize] == 0));
        }
    }
}

#[test]
fn closed_room_fills_every_column() {
    let scene = room();
    let mut r = renderer(320, 200, serial());
    let mut buffer = ScreenBuffer::new(320, 200);
    render_frame(&mut r, &scene, &mut buffer);
    assert!(r.solid_columns().iter().all(|c| *c != 0));

    // One sided walls share the screen out between them exactly
    let mut ranges: Vec<(i32, i32)> = r.drawseg_ranges().iter().map(|d| (d.1, d.2)).collect();
    ranges.sort_unstable();
    let mut next = 0;
    for (x1, x2) in ranges {
        assert_eq!(x1, next);
        assert!(x2 >= x1);
        next = x2 + 1;
    }
    assert_eq!(next, 320);
}

#[test]
fn nearer_wall_owns_the_overlap() {
    let mut solidcol = vec![0u8; 200];
    let mut stored = Vec::new();
    clip_wall_segment(&mut solidcol, 0, 100, true, |a, b| stored.push((a, b)));
    clip_wall_segment(&mut solidcol, 50, 150, true, |a, b| stored.push((a, b)));
    assert_eq!(stored, vec![(0, 99), (100, 149)]);
}

#[test]
fn back_facing_lines_are_culled() {
    let mut b = MapBuilder::new();
    let s = b.add_sector(open_sector(0, 128));
    b.add_room(s, (0, 0), (512, 512), 1);
    // Faces north, away from the player
    let away = b.add_line((450, 300), (350, 300), SideDef::new(s, 0, 1, 0), None, LineDefFlags::BLOCKING);
    // Faces south, towards the player
    let towards = b.add_line((200, 200), (300, 200), SideDef::new(s, 0, 1, 0), None, LineDefFlags::BLOCKING);
    let mut level = Level::new(b.build());
    let player = spawn_player(&mut level, 256, 64);
    let pic = pic_data();

    let mut r = renderer(320, 200, serial());
    let mut buffer = ScreenBuffer::new(320, 200);
    let scene = super::Scene {
        level,
        player,
        pic_data: pic,
    };
    render_frame(&mut r, &scene, &mut buffer);

    let drawn: Vec<usize> = r.drawseg_ranges().iter().map(|d| d.0).collect();
    let segs = &scene.level.map_data.segments;
    assert!(seg_of_line(segs, away).iter().all(|s| !drawn.contains(s)));
    assert!(seg_of_line(segs, towards).iter().any(|s| drawn.contains(s)));
}

/// Planes that share a key may overlap in columns once one has been
/// duplicated, but never claim the same pixel
fn assert_plane_keys_unique(r: &SoftwareRenderer) {
    let planes: Vec<_> = r
        .r_data
        .visplane_render
        .active_planes()
        .iter()
        .filter(|p| !p.is_empty())
        .collect();
    let span = |p: &Visplane, x: i32| {
        let (top, bottom) = (p.top(x), p.bottom(x));
        (top != PLANE_UNUSED && top <= bottom).then_some((top, bottom))
    };
    for (i, a) in planes.iter().enumerate() {
        for b in &planes[i + 1..] {
            if a.key != b.key {
                continue;
            }
            for x in a.minx.max(b.minx)..=a.maxx.min(b.maxx) {
                if let (Some((at, ab)), Some((bt, bb))) = (span(a, x), span(b, x)) {
                    assert!(ab < bt || bb < at, "planes {a:?} and {b:?} both cover column {x}");
                }
            }
        }
    }
}

/// Two level rooms with a raised step between them, so the far floor
/// shares the near floor's key in columns the near floor already holds
fn step_rooms() -> Scene {
    let mut b = MapBuilder::new();
    let near = b.add_sector(open_sector(0, 128));
    let step = b.add_sector(open_sector(16, 128));
    let far = b.add_sector(open_sector(0, 128));
    let wall = |s: usize| SideDef::new(s, 0, 1, 0);

    b.add_line((0, 0), (0, 256), wall(near), None, 0);
    b.add_line((512, 256), (512, 0), wall(near), None, 0);
    b.add_line((512, 0), (0, 0), wall(near), None, 0);
    let riser = |s: usize| SideDef::new(s, 0, 0, 1);
    let open = |s: usize| SideDef::new(s, 0, 0, 0);
    b.add_line((0, 256), (512, 256), riser(near), Some(open(step)), 0);
    b.add_line((0, 256), (0, 384), wall(step), None, 0);
    b.add_line((512, 384), (512, 256), wall(step), None, 0);
    b.add_line((0, 384), (512, 384), open(step), Some(riser(far)), 0);
    b.add_line((0, 384), (0, 640), wall(far), None, 0);
    b.add_line((0, 640), (512, 640), wall(far), None, 0);
    b.add_line((512, 640), (512, 384), wall(far), None, 0);

    let mut level = Level::new(b.build());
    let player = spawn_player(&mut level, 256, 64);
    Scene {
        level,
        player,
        pic_data: pic_data(),
    }
}

#[test]
fn equal_plane_keys_never_share_pixels() {
    for scene in [room(), window_rooms()] {
        let mut r = renderer(320, 200, serial());
        let mut buffer = ScreenBuffer::new(320, 200);
        render_frame(&mut r, &scene, &mut buffer);
        assert!(!r.r_data.visplane_render.active_planes().is_empty());
        assert_plane_keys_unique(&r);
    }
}

#[test]
fn floor_past_a_step_gets_a_duplicate_plane() {
    let scene = step_rooms();
    let mut r = renderer(320, 200, serial());
    let mut buffer = ScreenBuffer::new(320, 200);
    render_frame(&mut r, &scene, &mut buffer);

    let floor = |p: &&Visplane| p.key.height == 0 && !p.is_empty();
    let floors: Vec<_> = r.r_data.visplane_render.active_planes().iter().filter(floor).collect();
    assert!(floors.len() >= 2, "far floor reused the near plane");
    assert!(floors.iter().all(|p| p.key == floors[0].key));
    // The duplicate sits over columns the first plane already spans
    let (a, b) = (floors[0], floors[1]);
    assert!(a.minx.max(b.minx) <= a.maxx.min(b.maxx));
    assert_plane_keys_unique(&r);
}

#[test]
fn every_visible_leaf_is_visited_once() {
    let scene = window_rooms();
    let mut r = renderer(320, 200, serial());
    let mut buffer = ScreenBuffer::new(320, 200);
    render_frame(&mut r, &scene, &mut buffer);

    let visited = r.visited_subsectors().to_vec();
    let mut unique = visited.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), visited.len());

    let map = &scene.level.map_data;
    let own = scene.level.things[scene.player.mobj].subsector;
    assert!(visited.contains(&own));
    // Straight ahead through the window
    let far = map.point_in_subsector(256 << 16, 500 << 16);
    assert!(visited.contains(&far));

    // A second frame walks the same leaves
    render_frame(&mut r, &scene, &mut buffer);
    assert_eq!(r.visited_subsectors(), &visited[..]);
}

#[test]
fn window_leaves_columns_open_until_far_wall() {
    let scene = window_rooms();
    let mut r = renderer(320, 200, serial());
    let mut buffer = ScreenBuffer::new(320, 200);
    render_frame(&mut r, &scene, &mut buffer);
    // The far wall closes what the window left open
    assert!(r.solid_columns().iter().all(|c| *c != 0));
    let window_line = scene
        .level
        .map_data
        .linedefs
        .iter()
        .position(|l| l.backsector.is_some())
        .unwrap();
    let drawn: Vec<usize> = r.drawseg_ranges().iter().map(|d| d.0).collect();
    let segs = &scene.level.map_data.segments;
    assert!(seg_of_line(segs, window_line).iter().any(|s| drawn.contains(s)));
    // No middle texture on the window, so nothing masked
    assert!(
        r.r_data
            .drawsegs
            .iter()
            .all(|ds| ds.maskedtexturecol.is_none())
    );
    // The sill's silhouette is kept for sprites
    assert!(!r.r_data.visplane_render.openings.is_empty());
}
