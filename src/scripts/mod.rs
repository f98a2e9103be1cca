/*
 *
 *  *
 *  *      Copyright (c) 2018-2025, SnackCloud All rights reserved.
 *  *
 *  *   Redistribution and use in source and binary forms, with or without
 *  *   modification, are permitted provided that the following conditions are met:
 *  *
 *  *   Redistributions of source code must retain the above copyright notice,
 *  *   this list of conditions and the following disclaimer.
 *  *   Redistributions in binary form must reproduce the above copyright
 *  *   notice, this list of conditions and the following disclaimer in the
 *  *   documentation and/or other materials provided with the distribution.
 *  *   Neither the name of the www.snackcloud.cn developer nor the names of its
 *  *   contributors may be used to endorse or promote products derived from
 *  *   this software without specific prior written permission.
 *  *   Author: SnackCloud
 *  *
 *
 */

use once_cell::sync::Lazy;
use redis::Script;

/// Replace the holder id only if the current one matches.
/// A ttl of 0 stores the record without expiration.
pub static REPLACE_IF_EQUAL_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(r#"
        local key = KEYS[1]
        local expected = ARGV[1]
        local new_value = ARGV[2]
        local ttl = tonumber(ARGV[3])

        if redis.call('get', key) ~= expected then
            return 0  -- Held by someone else, or already gone
        end

        if ttl > 0 then
            redis.call('set', key, new_value, 'PX', ttl)
        else
            redis.call('set', key, new_value)
        end
        return 1
    "#)
});

/// Delete the record only if the current holder id matches.
pub static REMOVE_IF_EQUAL_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(r#"
        local key = KEYS[1]
        local expected = ARGV[1]

        if redis.call('get', key) == expected then
            return redis.call('del', key)
        end
        return 0
    "#)
});
