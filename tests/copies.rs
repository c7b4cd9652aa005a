// Copyright 2017 The Gfx-rs Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Copies must leave the same bytes behind whichever way they are recorded and whichever
//! backend executes them.

use rhi::encoder;
use rhi::immediate;
use rhi::{
    Backend, BufferDescription, BufferUsage, Device, DeviceDescription, Extent, Handle, Offset, PixelFormat,
    RawDevice, TextureCopy, TextureDescription, TextureRegion, TextureUsage,
};

type TextureHandle = Handle<rhi::handle::kind::Texture>;

fn open<B: Backend>() -> Device<B> {
    let _ = env_logger::try_init();
    Device::open(DeviceDescription {
        debug: true,
        ..DeviceDescription::default()
    })
    .unwrap()
}

fn mip_chain_desc(usage: TextureUsage) -> TextureDescription {
    TextureDescription {
        array_layers: 2,
        ..TextureDescription::new_2d(16, 8, 4, PixelFormat::R8G8B8A8UNorm, usage)
    }
}

/// A texture whose every subresource holds distinct bytes.
fn filled_texture<B: Backend>(device: &Device<B>, desc: &TextureDescription) -> TextureHandle {
    let texture = device.factory().create_texture(desc).unwrap();
    for layer in 0..desc.array_layers {
        for mip in 0..desc.mip_count {
            let region = TextureRegion::whole(desc, mip, layer);
            let size = region.data_size(desc.format) as usize;
            let data: Vec<u8> = (0..size).map(|i| (i as u32 * 7 + mip * 31 + layer * 101) as u8).collect();
            device.update_texture(texture, &data, &region).unwrap();
        }
    }
    texture
}

fn contents<B: Backend>(device: &Device<B>, texture: TextureHandle, desc: &TextureDescription) -> Vec<Vec<u8>> {
    device.wait_for_idle();
    let raw = device.resource_manager().resolve(texture).unwrap();
    let mut out = Vec::new();
    for layer in 0..desc.array_layers {
        for mip in 0..desc.mip_count {
            out.push(device.raw().read_texture(&raw, mip, layer));
        }
    }
    out
}

/// Copy `source` into a fresh texture of `usage` two ways: whole, and region by region.
fn copy_both_ways<B: Backend>(source_usage: TextureUsage, destination_usage: TextureUsage) -> Vec<Vec<u8>> {
    let device = open::<B>();
    let source_desc = mip_chain_desc(source_usage);
    let destination_desc = mip_chain_desc(destination_usage);
    let source = filled_texture(&device, &source_desc);
    let whole = device.factory().create_texture(&destination_desc).unwrap();
    let regions = device.factory().create_texture(&destination_desc).unwrap();

    let mut list = device.factory().create_command_list().unwrap();
    list.begin().unwrap();
    list.copy_texture(source, whole).unwrap();
    for mip in 0..source_desc.mip_count {
        list.copy_texture_region(source, regions, &TextureCopy::whole_mip(&source_desc, mip))
            .unwrap();
    }
    list.end().unwrap();
    device.submit_command_list(&mut list, None).unwrap();

    let expected = contents(&device, source, &source_desc);
    assert_eq!(contents(&device, whole, &destination_desc), expected);
    assert_eq!(contents(&device, regions, &destination_desc), expected);
    expected
}

fn all_copy_kinds<B: Backend>() -> Vec<Vec<Vec<u8>>> {
    let (gpu, staging) = (TextureUsage::SAMPLED, TextureUsage::STAGING);
    vec![
        copy_both_ways::<B>(gpu, gpu),
        copy_both_ways::<B>(staging, gpu),
        copy_both_ways::<B>(gpu, staging),
        copy_both_ways::<B>(staging, staging),
    ]
}

#[test]
fn test_whole_and_region_copies_agree() {
    let immediate = all_copy_kinds::<immediate::Backend>();
    let encoder = all_copy_kinds::<encoder::Backend>();
    assert_eq!(immediate, encoder);
}

fn partial_region<B: Backend>(source_usage: TextureUsage, destination_usage: TextureUsage) -> Vec<u8> {
    let device = open::<B>();
    let desc = TextureDescription::new_2d(8, 8, 1, PixelFormat::R8G8B8A8UNorm, source_usage);
    let source = filled_texture(&device, &desc);
    let destination_desc = TextureDescription {
        usage: destination_usage,
        ..desc.clone()
    };
    let destination = device.factory().create_texture(&destination_desc).unwrap();

    let mut list = device.factory().create_command_list().unwrap();
    list.begin().unwrap();
    list.copy_texture_region(
        source,
        destination,
        &TextureCopy {
            src_origin: Offset { x: 1, y: 2, z: 0 },
            dst_origin: Offset { x: 4, y: 5, z: 0 },
            extent: Extent {
                width: 3,
                height: 2,
                depth: 1,
            },
            ..TextureCopy::whole_mip(&desc, 0)
        },
    )
    .unwrap();
    list.end().unwrap();
    device.submit_command_list(&mut list, None).unwrap();

    let mut data = contents(&device, destination, &destination_desc);
    data.remove(0)
}

#[test]
fn test_partial_region_copies_agree() {
    let (gpu, staging) = (TextureUsage::SAMPLED, TextureUsage::STAGING);
    for &(source, destination) in &[(gpu, gpu), (staging, gpu), (gpu, staging), (staging, staging)] {
        let expected = partial_region::<immediate::Backend>(source, destination);
        assert_eq!(partial_region::<encoder::Backend>(source, destination), expected);

        let row_pitch = 8 * 4;
        let texel = |x: usize, y: usize| &expected[y * row_pitch + x * 4..y * row_pitch + x * 4 + 4];
        assert_eq!(texel(0, 0), &[0, 0, 0, 0]);
        assert_ne!(texel(4, 5), &[0, 0, 0, 0]);
        assert_ne!(texel(6, 6), &[0, 0, 0, 0]);
        assert_eq!(texel(7, 6), &[0, 0, 0, 0]);
    }
}

fn buffer_copies<B: Backend>() -> Vec<u8> {
    let device = open::<B>();
    let factory = device.factory();
    let data: Vec<u8> = (1..=64).collect();
    let source = factory
        .create_buffer(&BufferDescription::new(64, BufferUsage::VERTEX), Some(&data[..]))
        .unwrap();
    let destination = factory
        .create_buffer(&BufferDescription::new(64, BufferUsage::VERTEX), None)
        .unwrap();

    let mut list = factory.create_command_list().unwrap();
    list.begin().unwrap();
    list.copy_buffer(source, 0, destination, 0, 16).unwrap();
    list.copy_buffer(source, 3, destination, 17, 5).unwrap();
    list.update_buffer(destination, 30, &[0xAA, 0xBB, 0xCC]).unwrap();
    list.update_buffer(destination, 40, &[0xEE; 8]).unwrap();
    list.copy_buffer(destination, 40, destination, 50, 4).unwrap();
    list.end().unwrap();
    device.submit_command_list(&mut list, None).unwrap();

    let raw = device.resource_manager().resolve(destination).unwrap();
    device.raw().read_buffer(&raw, 0, 64)
}

#[test]
fn test_buffer_copies_agree() {
    let expected = buffer_copies::<immediate::Backend>();
    assert_eq!(buffer_copies::<encoder::Backend>(), expected);
    assert_eq!(&expected[..16], &(1..=16).collect::<Vec<u8>>()[..]);
    assert_eq!(&expected[16..23], &[0, 4, 5, 6, 7, 8, 0]);
    assert_eq!(&expected[30..33], &[0xAA, 0xBB, 0xCC]);
    assert_eq!(&expected[50..54], &[0xEE; 4]);
}
